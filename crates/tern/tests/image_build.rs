//! Integration tests for image bootstrap and build steps.

mod common;

use std::sync::Arc;

use common::{Call, FakeBootstrap, RecordingSupervisor, sandbox, seed_image};
use tern::runtime::{BuildStep, ImageBuilder};
use tern_common::{ContainerName, TernError};

fn name(value: &str) -> ContainerName {
    ContainerName::new(value).unwrap()
}

#[test_log::test(tokio::test)]
async fn bootstrap_applies_baseline_in_order() {
    let supervisor = Arc::new(RecordingSupervisor::new());
    let (dir, runtime) = sandbox(supervisor.clone()).await;
    let bootstrap = Arc::new(FakeBootstrap::default());

    ImageBuilder::new(&runtime, bootstrap.clone())
        .build(&name("base"))
        .await
        .unwrap();

    let image = dir.path().join("machines/base");
    assert_eq!(*bootstrap.populated.lock().unwrap(), [image.clone()]);

    let scripts = supervisor.scripts();
    assert_eq!(scripts.len(), 3);
    assert!(scripts[0].contains("\nsystemctl enable systemd-networkd systemd-resolved\n"));
    assert!(scripts[1].contains("\nrm -f /etc/resolv.conf\n"));
    assert!(scripts[2].contains("\nln -sf /run/systemd/resolve/resolv.conf /etc/resolv.conf\n"));
    assert!(scripts.iter().all(|s| s.contains("nameserver 8.8.8.8")));
    assert!(
        supervisor
            .calls()
            .iter()
            .all(|call| matches!(call, Call::Offline { root, machine_id: None, .. } if *root == image)),
        "baseline steps must run before the machine-id marker exists"
    );

    assert_eq!(
        std::fs::read_to_string(image.join("etc/machine-id")).unwrap(),
        "REPLACE_ME\n"
    );
    let network =
        std::fs::read_to_string(image.join("etc/systemd/network/80-container-host0.network"))
            .unwrap();
    assert!(network.contains("Name=host0"));
    assert!(network.contains("tern0"));

    let leftovers: Vec<_> = std::fs::read_dir(image.join("tmp")).unwrap().collect();
    assert!(leftovers.is_empty(), "build scripts written into the tree");
}

#[tokio::test]
async fn build_stops_at_first_failure() {
    let supervisor = Arc::new(RecordingSupervisor::new().with_offline_statuses(&[0, 5, 0]));
    let (dir, runtime) = sandbox(supervisor.clone()).await;
    seed_image(&runtime, "base").await;

    let steps = [
        BuildStep::run("true"),
        BuildStep::run("exit 5"),
        BuildStep::run("touch /never"),
    ];
    let err = runtime
        .image(&name("base"))
        .build_all(&steps)
        .await
        .unwrap_err();

    match err {
        TernError::BuildStep {
            container,
            index,
            step,
            status,
        } => {
            assert_eq!(container, "base");
            assert_eq!(index, 1);
            assert_eq!(step, "RUN exit 5");
            assert_eq!(status, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(supervisor.scripts().len(), 2);
    assert!(!dir.path().join("machines/base/never").exists());
}

#[tokio::test]
async fn failed_baseline_step_skips_network_descriptor() {
    let supervisor = Arc::new(RecordingSupervisor::new().with_offline_statuses(&[1]));
    let (dir, runtime) = sandbox(supervisor.clone()).await;

    let err = ImageBuilder::new(&runtime, Arc::new(FakeBootstrap::default()))
        .build(&name("base"))
        .await
        .unwrap_err();

    assert!(matches!(err, TernError::BuildStep { index: 0, .. }), "{err}");
    assert_eq!(supervisor.scripts().len(), 1);

    let image = dir.path().join("machines/base");
    assert!(image.is_dir(), "failed build is not rolled back");
    assert!(!image.join("etc/machine-id").exists());
    assert!(!image.join("etc/systemd/network/80-container-host0.network").exists());
}

#[tokio::test]
async fn bootstrap_failure_runs_no_steps() {
    let supervisor = Arc::new(RecordingSupervisor::new());
    let (_dir, runtime) = sandbox(supervisor.clone()).await;
    let bootstrap = FakeBootstrap {
        fail: true,
        ..FakeBootstrap::default()
    };

    let err = ImageBuilder::new(&runtime, Arc::new(bootstrap))
        .build(&name("base"))
        .await
        .unwrap_err();

    assert!(matches!(err, TernError::Bootstrap { .. }));
    assert!(supervisor.calls().is_empty());
}

#[tokio::test]
async fn existing_image_is_not_rebuilt() {
    let supervisor = Arc::new(RecordingSupervisor::new());
    let (_dir, runtime) = sandbox(supervisor.clone()).await;
    seed_image(&runtime, "base").await;
    let bootstrap = Arc::new(FakeBootstrap::default());

    let err = ImageBuilder::new(&runtime, bootstrap.clone())
        .build(&name("base"))
        .await
        .unwrap_err();

    assert!(matches!(err, TernError::Create { .. }));
    assert!(bootstrap.populated.lock().unwrap().is_empty());
}

#[tokio::test]
async fn enable_step_against_a_container() {
    let supervisor = Arc::new(RecordingSupervisor::new());
    let (_dir, runtime) = sandbox(supervisor.clone()).await;
    seed_image(&runtime, "base").await;
    runtime
        .store()
        .snapshot("base", ".#web", false)
        .await
        .unwrap();

    runtime
        .container(&name("web"))
        .build(&BuildStep::enable(["nginx.service"]))
        .await
        .unwrap();

    let scripts = supervisor.scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("\nsystemctl enable nginx.service\n"));
}
