use std::path::Path;

use crate::errors::{GopinError, Result};

/// Creates an unversioned forwarding link next to a pinned binary, so the
/// tool can also be invoked without its version suffix.
///
/// On Unix systems this is a symbolic link at `link_path` pointing to
/// `target`. On Windows it is a `.bat` script calling the target. Any
/// previous link under the same name is replaced.
///
/// # Errors
///
/// Returns an error if removing a stale link or creating the new one fails.
pub fn create_link<P: AsRef<Path>>(target: P, link_path: P) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::symlink;
        let link_path = link_path.as_ref();
        if link_path.symlink_metadata().is_ok() {
            std::fs::remove_file(link_path).map_err(|e| GopinError::io(link_path, e))?;
        }
        symlink(target.as_ref(), link_path).map_err(|e| GopinError::io(link_path, e))?;
    }
    #[cfg(windows)]
    {
        let script_path = link_path.as_ref().with_extension("bat");
        let script = format!(
            "@echo off\r\ncall \"{}\" %*\r\n",
            target.as_ref().display()
        );
        std::fs::write(&script_path, script).map_err(|e| GopinError::io(&script_path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    #[cfg(unix)]
    fn test_create_link_points_at_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("tool-v1.0.0");
        std::fs::write(&target, "bin").unwrap();
        let link = dir.path().join("tool");

        create_link(&target, &link).unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), target);
    }

    #[test]
    #[cfg(unix)]
    fn test_create_link_replaces_previous_link() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("tool-v1.0.0");
        let new = dir.path().join("tool-v2.0.0");
        std::fs::write(&old, "bin").unwrap();
        std::fs::write(&new, "bin").unwrap();
        let link = dir.path().join("tool");

        create_link(&old, &link).unwrap();
        create_link(&new, &link).unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), new);
    }
}
