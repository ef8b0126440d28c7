//! Atomic file replacement.

use std::io::Write;
use std::path::Path;

/// Write `contents` to `path` through a temporary file in the same directory.
///
/// Readers see either the previous file or the complete new one, never a
/// partial write. The parent directory is created when missing.
///
/// # Errors
///
/// Returns an error if the directory, temporary file or rename fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tern-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::trace!(path = %path.display(), bytes = contents.len(), "File replaced");
    Ok(())
}
