//! Image attachment storage under `<project>/.beads/images/<bead-id>/`.
//!
//! The files themselves are written by the clipboard helper or copied from
//! user-supplied paths; this module owns the layout and the filesystem
//! bookkeeping around them.

use std::path::{Path, PathBuf};

use az_core::error::{AzError, Result};
use az_core::types::BeadId;
use chrono::Utc;
use tracing::debug;

/// Directory holding a bead's attachments.
pub fn attachment_dir(project: &Path, bead: &BeadId) -> PathBuf {
    project.join(".beads").join("images").join(bead)
}

/// List a bead's attachments, sorted by file name. Missing directory means
/// no attachments.
pub fn list_attachments(project: &Path, bead: &BeadId) -> Result<Vec<PathBuf>> {
    let dir = attachment_dir(project, bead);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
        .map_err(|e| AzError::io("listing attachments", &dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Generate the destination path for a freshly pasted image.
pub fn pasted_image_path(project: &Path, bead: &BeadId) -> PathBuf {
    let name = format!("paste-{}.png", Utc::now().format("%Y%m%d-%H%M%S"));
    attachment_dir(project, bead).join(name)
}

/// Copy an arbitrary file into a bead's attachment directory.
pub fn attach_file(project: &Path, bead: &BeadId, source: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(AzError::validation(format!(
            "not a file: {}",
            source.display()
        )));
    }
    let dir = attachment_dir(project, bead);
    std::fs::create_dir_all(&dir).map_err(|e| AzError::io("creating attachment dir", &dir, e))?;

    let name = source
        .file_name()
        .ok_or_else(|| AzError::validation("source path has no file name"))?;
    let dest = dir.join(name);
    std::fs::copy(source, &dest).map_err(|e| AzError::io("copying attachment", &dest, e))?;
    debug!(bead, dest = %dest.display(), "attached file");
    Ok(dest)
}

/// Delete one attachment. Idempotent on a missing file.
pub fn delete_attachment(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AzError::io("deleting attachment", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let dir = attachment_dir(Path::new("/proj"), &"az-1".to_string());
        assert_eq!(dir, PathBuf::from("/proj/.beads/images/az-1"));
    }

    #[test]
    fn test_list_empty_when_missing() {
        let tmp = TempDir::new().unwrap();
        let files = list_attachments(tmp.path(), &"az-1".to_string()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_attach_and_list_and_delete() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("shot.png");
        std::fs::write(&source, b"png").unwrap();

        let bead = "az-1".to_string();
        let dest = attach_file(tmp.path(), &bead, &source).unwrap();
        assert!(dest.ends_with(".beads/images/az-1/shot.png"));

        let files = list_attachments(tmp.path(), &bead).unwrap();
        assert_eq!(files, vec![dest.clone()]);

        delete_attachment(&dest).unwrap();
        // Idempotent
        delete_attachment(&dest).unwrap();
        assert!(list_attachments(tmp.path(), &bead).unwrap().is_empty());
    }

    #[test]
    fn test_attach_rejects_directory() {
        let tmp = TempDir::new().unwrap();
        let err = attach_file(tmp.path(), &"az-1".to_string(), tmp.path()).unwrap_err();
        assert!(matches!(err, AzError::Validation { .. }));
    }
}
