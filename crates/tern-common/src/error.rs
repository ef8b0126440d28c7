//! Common error types for the Tern runtime.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`TernError`].
pub type TernResult<T> = Result<T, TernError>;

/// Errors across the Tern runtime.
///
/// Every variant renders as a single line so the CLI can report it verbatim.
#[derive(Error, Diagnostic, Debug)]
pub enum TernError {
    /// The filesystem store could not be opened.
    #[error("Cannot open store at {}: {reason}", root.display())]
    #[diagnostic(
        code(tern::fs::init),
        help("The store root must be a directory on a btrfs filesystem (or use --driver directory)")
    )]
    Init {
        /// Store root directory.
        root: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A subvolume could not be created.
    #[error("Cannot create subvolume {}: {reason}", path.display())]
    #[diagnostic(code(tern::fs::create))]
    Create {
        /// Requested subvolume path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A snapshot could not be created or replaced.
    #[error("Cannot snapshot into {}: {reason}", dest.display())]
    #[diagnostic(code(tern::fs::snapshot))]
    Snapshot {
        /// Snapshot destination.
        dest: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A template parameter record was malformed.
    #[error("Cannot render {template} template: {reason}")]
    #[diagnostic(code(tern::unit::template))]
    Template {
        /// Template kind.
        template: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// Reading or writing a unit file failed.
    #[error("Unit file {}: {source}", path.display())]
    #[diagnostic(code(tern::unit::io))]
    UnitIo {
        /// Unit file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The supervisor refused to activate an instance.
    #[error("Cannot enable {instance}: {reason}")]
    #[diagnostic(code(tern::supervisor::activation), help("Run `tern init` to install the unit"))]
    Activation {
        /// Unit instance name.
        instance: String,
        /// What went wrong.
        reason: String,
    },

    /// The supervisor refused to start an instance.
    #[error("Cannot start {instance}: {reason}")]
    #[diagnostic(code(tern::supervisor::start))]
    Start {
        /// Unit instance name.
        instance: String,
        /// What went wrong.
        reason: String,
    },

    /// A build step exited unsuccessfully.
    #[error("Build step {index} ({step}) failed in {container} with status {status}")]
    #[diagnostic(code(tern::build::step))]
    BuildStep {
        /// Container or image the step ran against.
        container: String,
        /// Zero-based position of the step in its sequence.
        index: usize,
        /// Short description of the step.
        step: String,
        /// Exit status of the step, `-1` when killed by a signal.
        status: i32,
    },

    /// The root filesystem bootstrap tool failed.
    #[error("Cannot bootstrap image {image}: {reason}")]
    #[diagnostic(code(tern::build::bootstrap), help("Is pacstrap installed? Try `tern pull` instead"))]
    Bootstrap {
        /// Image name.
        image: String,
        /// What went wrong.
        reason: String,
    },

    /// A network descriptor could not be written.
    #[error("Cannot write network descriptor {}: {reason}", path.display())]
    #[diagnostic(code(tern::network))]
    Network {
        /// Descriptor path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Downloading or extracting an image archive failed.
    #[error("Cannot fetch {url}: {reason}")]
    #[diagnostic(code(tern::image::fetch))]
    Fetch {
        /// Archive URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// The attach session failed or ended unsuccessfully.
    #[error("Attach to {container} failed: {reason}")]
    #[diagnostic(code(tern::attach))]
    Attach {
        /// Container name.
        container: String,
        /// What went wrong.
        reason: String,
    },

    /// An external call did not finish in time.
    #[error("{operation} timed out after {seconds}s")]
    #[diagnostic(code(tern::timeout))]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// Timeout in seconds.
        seconds: u64,
    },

    /// Invalid container or image name.
    #[error("Invalid name: {name:?}")]
    #[diagnostic(
        code(tern::invalid_name),
        help("Names must be alphanumeric with hyphens, underscores and dots, 1-64 characters")
    )]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// A command line value could not be parsed.
    #[error("Invalid value {value:?}, expected {expected}")]
    #[diagnostic(code(tern::parse))]
    Parse {
        /// The rejected value.
        value: String,
        /// Expected format.
        expected: &'static str,
    },

    /// Container root snapshot does not exist.
    #[error("Container not found: {name}")]
    #[diagnostic(code(tern::container::not_found))]
    ContainerNotFound {
        /// Container name.
        name: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(tern::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(tern::io))]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TernError::Snapshot {
            dest: PathBuf::from("/var/lib/machines/.#test"),
            reason: "source missing-image does not exist".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot snapshot into /var/lib/machines/.#test: source missing-image does not exist"
        );
    }

    #[test]
    fn build_step_names_the_step() {
        let err = TernError::BuildStep {
            container: "base".to_string(),
            index: 1,
            step: "RUN rm -f /etc/resolv.conf".to_string(),
            status: 2,
        };
        assert_eq!(
            err.to_string(),
            "Build step 1 (RUN rm -f /etc/resolv.conf) failed in base with status 2"
        );
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TernError = io_err.into();
        assert!(matches!(err, TernError::Io(_)));
    }

    #[test]
    fn messages_are_single_line() {
        let err = TernError::UnitIo {
            path: PathBuf::from("/etc/systemd/system/tern@.service"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
        };
        assert!(!err.to_string().contains('\n'));
    }
}
