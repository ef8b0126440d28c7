//! Fixed text templates.
//!
//! Every body is a compile-time constant with `{{key}}` holes. Rendering
//! validates the parameter record and fills the holes; it never touches the
//! filesystem.

use std::fmt::Write as _;
use std::net::IpAddr;

use tern_common::id::MACHINE_ID_PLACEHOLDER;
use tern_common::{MachineId, TernError, TernResult};

use crate::runtime::BindSpec;

const UNIT_BODY: &str = r#"[Unit]
Description=Tern container %i
Documentation=man:systemd-nspawn(1)
PartOf=machines.target
Before=machines.target
After=network.target

[Service]
ExecStartPre=/bin/sed -i "s/{{placeholder}}/${MACHINE_ID}/" {{root_prefix}}%i/etc/machine-id
ExecStartPre=/bin/chmod a-w {{root_prefix}}%i/etc/machine-id
ExecStart=/usr/bin/systemd-nspawn --machine %i --uuid=${MACHINE_ID} --quiet --private-network --network-veth --network-bridge={{bridge}} --keep-unit --boot --link-journal=guest --directory={{root_prefix}}%i
KillMode=mixed
Type=notify
RestartForceExitStatus=133
SuccessExitStatus=133
Slice=machine.slice
Delegate=yes

[Install]
WantedBy=multi-user.target
"#;

const ENVIRONMENT_BODY: &str = r#"[Service]
Environment="MACHINE_ID={{machine_id}}"
"#;

const MACHINE_ID_BODY: &str = "{{machine_id}}\n";

const BUILD_STEP_BODY: &str = r#"#!/bin/sh
resolv={{resolv_conf}}
backup="$resolv.tern-backup"

restore() {
    if [ -e "$backup" ]; then
        mv -f "$backup" "$resolv"
    else
        rm -f "$resolv"
    fi
}

trap restore EXIT
trap 'exit 130' INT
trap 'exit 143' TERM

mkdir -p "${resolv%/*}"
if [ -e "$resolv" ]; then
    cp -p "$resolv" "$backup"
fi
echo 'nameserver {{nameserver}}' > "$resolv"

(
{{payload}}
)
rc=$?
exit $rc
"#;

const SETTINGS_HEADER: &str = "[Files]\n";

/// A template together with its parameter record.
#[derive(Debug, Clone, Copy)]
pub enum Template<'a> {
    /// The shared `tern@.service` unit.
    Unit {
        /// Host bridge the container veth joins.
        bridge: &'a str,
        /// Absolute prefix the instance name is appended to.
        root_prefix: &'a str,
    },
    /// Per-instance drop-in carrying the machine identity.
    Environment {
        /// The instance's machine identity.
        machine_id: &'a MachineId,
    },
    /// Machine-identity marker file.
    MachineId {
        /// A machine identity or the placeholder marker.
        machine_id: &'a str,
    },
    /// Shell wrapper around one build step payload.
    BuildStep {
        /// Shell command to run.
        payload: &'a str,
        /// Resolver used while the payload runs.
        nameserver: &'a str,
        /// Absolute path of the resolver file the step may rely on.
        resolv_conf: &'a str,
    },
    /// Per-machine settings file with bind mounts.
    Settings {
        /// Binds applied at start.
        binds: &'a [BindSpec],
    },
}

impl Template<'_> {
    /// Template kind, used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unit { .. } => "unit",
            Self::Environment { .. } => "environment",
            Self::MachineId { .. } => "machine-id",
            Self::BuildStep { .. } => "build-step",
            Self::Settings { .. } => "settings",
        }
    }
}

/// Render a template.
///
/// # Errors
///
/// Returns [`TernError::Template`] if a parameter is empty, contains a
/// control character or is otherwise unusable in the target format.
pub fn render(template: &Template<'_>) -> TernResult<String> {
    let fail = |reason: String| TernError::Template {
        template: template.name(),
        reason,
    };

    match *template {
        Template::Unit {
            bridge,
            root_prefix,
        } => {
            check_line("bridge", bridge).map_err(fail)?;
            check_line("root prefix", root_prefix).map_err(fail)?;
            if bridge.contains(|c: char| c.is_whitespace() || c == '/' || c == '%') {
                return Err(fail(format!("bridge {bridge:?} is not an interface name")));
            }
            if !root_prefix.starts_with('/') {
                return Err(fail(format!("root prefix {root_prefix:?} is not absolute")));
            }
            if root_prefix.contains(|c: char| c.is_whitespace() || matches!(c, '%' | '"' | '\\')) {
                return Err(fail(format!(
                    "root prefix {root_prefix:?} contains characters systemd would interpret"
                )));
            }
            Ok(fill(
                UNIT_BODY,
                &[
                    ("placeholder", MACHINE_ID_PLACEHOLDER),
                    ("root_prefix", root_prefix),
                    ("bridge", bridge),
                ],
            ))
        }
        Template::Environment { machine_id } => Ok(fill(
            ENVIRONMENT_BODY,
            &[("machine_id", machine_id.as_str())],
        )),
        Template::MachineId { machine_id } => {
            if machine_id != MACHINE_ID_PLACEHOLDER {
                MachineId::parse(machine_id).map_err(|e| fail(e.to_string()))?;
            }
            Ok(fill(MACHINE_ID_BODY, &[("machine_id", machine_id)]))
        }
        Template::BuildStep {
            payload,
            nameserver,
            resolv_conf,
        } => {
            check_line("payload", payload).map_err(fail)?;
            if nameserver.parse::<IpAddr>().is_err() {
                return Err(fail(format!("nameserver {nameserver:?} is not an IP address")));
            }
            let plain = resolv_conf
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-'));
            if !resolv_conf.starts_with('/') || resolv_conf.ends_with('/') || !plain {
                return Err(fail(format!(
                    "resolver path {resolv_conf:?} is not a plain absolute file path"
                )));
            }
            Ok(fill(
                BUILD_STEP_BODY,
                &[
                    ("resolv_conf", resolv_conf),
                    ("nameserver", nameserver),
                    ("payload", payload),
                ],
            ))
        }
        Template::Settings { binds } => {
            let mut settings = SETTINGS_HEADER.to_string();
            for bind in binds {
                let host = bind.host.to_str().ok_or_else(|| {
                    fail(format!("bind host path {:?} is not UTF-8", bind.host))
                })?;
                let container = bind.container.to_str().ok_or_else(|| {
                    fail(format!("bind container path {:?} is not UTF-8", bind.container))
                })?;
                for (what, path) in [("bind host path", host), ("bind container path", container)] {
                    check_line(what, path).map_err(fail)?;
                    if path.contains(':') {
                        return Err(fail(format!("{what} {path:?} contains ':'")));
                    }
                    if !path.starts_with('/') {
                        return Err(fail(format!("{what} {path:?} is not absolute")));
                    }
                }
                let _ = writeln!(settings, "Bind={host}:{container}");
            }
            Ok(settings)
        }
    }
}

/// Reject empty values and values that would break a line-based format.
fn check_line(what: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{what} is empty"));
    }
    if value.contains(char::is_control) {
        return Err(format!("{what} {value:?} contains a control character"));
    }
    Ok(())
}

/// Replace every `{{key}}` hole in `body`.
fn fill(body: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(body.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{{{key}}}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(host: &str, container: &str) -> BindSpec {
        BindSpec {
            host: host.into(),
            container: container.into(),
        }
    }

    #[test]
    fn unit_fills_every_hole() {
        let text = render(&Template::Unit {
            bridge: "tern0",
            root_prefix: "/var/lib/machines/.#",
        })
        .unwrap();

        assert!(!text.contains("{{"));
        assert!(text.contains("--network-bridge=tern0 "));
        assert!(text.contains("--directory=/var/lib/machines/.#%i\n"));
        assert!(text.contains(
            "ExecStartPre=/bin/sed -i \"s/REPLACE_ME/${MACHINE_ID}/\" /var/lib/machines/.#%i/etc/machine-id\n"
        ));
        assert!(text.contains("KillMode=mixed\nType=notify\n"));
        assert!(text.ends_with("[Install]\nWantedBy=multi-user.target\n"));
    }

    #[test]
    fn unit_is_deterministic() {
        let template = Template::Unit {
            bridge: "br0",
            root_prefix: "/srv/.#",
        };
        assert_eq!(render(&template).unwrap(), render(&template).unwrap());
    }

    #[test]
    fn unit_rejects_bad_parameters() {
        for (bridge, root_prefix) in [
            ("", "/var/lib/machines/.#"),
            ("tern0", "relative/.#"),
            ("tern0", "/var/lib/machines/.#\nExecStart=/bin/evil"),
            ("tern0", "/var/lib/my machines/.#"),
            ("tern 0", "/var/lib/machines/.#"),
            ("tern0", "/var/%n/.#"),
        ] {
            let err = render(&Template::Unit {
                bridge,
                root_prefix,
            })
            .unwrap_err();
            assert!(
                matches!(err, TernError::Template { template: "unit", .. }),
                "{bridge:?} {root_prefix:?}"
            );
        }
    }

    #[test]
    fn environment_drop_in() {
        let id = MachineId::parse("0123456789abcdef0123456789abcdef").unwrap();
        insta::assert_snapshot!(render(&Template::Environment { machine_id: &id }).unwrap(), @r#"
[Service]
Environment="MACHINE_ID=0123456789abcdef0123456789abcdef"
"#);
    }

    #[test]
    fn machine_id_marker() {
        assert_eq!(
            render(&Template::MachineId {
                machine_id: MACHINE_ID_PLACEHOLDER
            })
            .unwrap(),
            "REPLACE_ME\n"
        );
        assert!(render(&Template::MachineId { machine_id: "nope" }).is_err());
    }

    const RESOLV: &str = "/run/systemd/resolve/resolv.conf";

    #[test]
    fn build_step_wraps_payload() {
        let text = render(&Template::BuildStep {
            payload: "systemctl enable systemd-networkd",
            nameserver: "1.1.1.1",
            resolv_conf: RESOLV,
        })
        .unwrap();

        assert!(text.starts_with("#!/bin/sh\nresolv=/run/systemd/resolve/resolv.conf\n"));
        assert!(text.contains("echo 'nameserver 1.1.1.1' > \"$resolv\"\n"));
        assert!(text.contains("(\nsystemctl enable systemd-networkd\n)\nrc=$?\nexit $rc\n"));
        assert!(text.find("trap restore EXIT") < text.find("systemctl enable"));
    }

    #[test]
    fn build_step_rejects_bad_parameters() {
        for (payload, nameserver, resolv_conf) in [
            ("", "8.8.8.8", RESOLV),
            ("true\nfalse", "8.8.8.8", RESOLV),
            ("true", "dns.example", RESOLV),
            ("true", "8.8.8.8; rm -rf /", RESOLV),
            ("true", "8.8.8.8", "resolv.conf"),
            ("true", "8.8.8.8", "/run/$(reboot)"),
            ("true", "8.8.8.8", "/run/my resolv.conf"),
        ] {
            assert!(
                render(&Template::BuildStep {
                    payload,
                    nameserver,
                    resolv_conf,
                })
                .is_err(),
                "{payload:?} {nameserver:?} {resolv_conf:?}"
            );
        }
    }

    /// Run the wrapper with the host shell against a sandboxed resolver.
    fn run_wrapper(payload: &str, resolv: &std::path::Path) -> i32 {
        let text = render(&Template::BuildStep {
            payload,
            nameserver: "9.9.9.9",
            resolv_conf: resolv.to_str().unwrap(),
        })
        .unwrap();
        std::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(&text)
            .status()
            .unwrap()
            .code()
            .unwrap()
    }

    #[test]
    fn build_step_restores_existing_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let resolv = dir.path().join("resolve/resolv.conf");
        std::fs::create_dir_all(dir.path().join("resolve")).unwrap();
        std::fs::write(&resolv, "nameserver 127.0.0.53\n").unwrap();

        let payload = format!("grep -qx 'nameserver 9.9.9.9' {} && exit 3", resolv.display());
        assert_eq!(run_wrapper(&payload, &resolv), 3);

        assert_eq!(
            std::fs::read_to_string(&resolv).unwrap(),
            "nameserver 127.0.0.53\n"
        );
        assert!(!dir.path().join("resolve/resolv.conf.tern-backup").exists());
    }

    #[test]
    fn build_step_removes_temporary_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let resolv = dir.path().join("resolve/resolv.conf");

        assert_eq!(run_wrapper("true", &resolv), 0);
        assert!(dir.path().join("resolve").is_dir());
        assert!(!resolv.exists());

        assert_eq!(run_wrapper("false", &resolv), 1);
        assert!(!resolv.exists());
    }

    #[test]
    fn settings_lists_binds_in_order() {
        let binds = [bind("/var/data", "/data"), bind("/srv/www", "/var/www")];
        insta::assert_snapshot!(render(&Template::Settings { binds: &binds }).unwrap(), @r"
[Files]
Bind=/var/data:/data
Bind=/srv/www:/var/www
");
    }

    #[test]
    fn settings_rejects_colons() {
        let binds = [bind("/var/da:ta", "/data")];
        let err = render(&Template::Settings { binds: &binds }).unwrap_err();
        assert!(matches!(err, TernError::Template { template: "settings", .. }));
    }
}
