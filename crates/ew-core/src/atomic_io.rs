use std::path::Path;

use anyhow::{bail, Context, Result};

/// Writes text using a temp file + rename so readers never observe
/// partial data.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    write_atomic_inner(path, content, None)
}

/// Same as [`write_text_atomic`] but chmods the result to 0600 before
/// the rename lands (state and config files carry user secrets).
pub fn write_secure_text_atomic(path: &Path, content: &str) -> Result<()> {
    write_atomic_inner(path, content, Some(0o600))
}

fn write_atomic_inner(path: &Path, content: &str, mode: Option<u32>) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.exists() && path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_name = format!(
        ".{}.tmp-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("ew-state"),
        std::process::id(),
    );
    let temp_path = parent_dir.join(temp_name);
    std::fs::write(&temp_path, content)
        .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;

    #[cfg(unix)]
    if let Some(bits) = mode {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(bits))
            .with_context(|| format!("failed to secure temporary file {}", temp_path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to rename temporary file {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_write_replaces_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        write_text_atomic(&path, "first").expect("first write");
        write_text_atomic(&path, "second").expect("second write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "second");
    }

    #[test]
    fn regression_write_rejects_directory_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = write_text_atomic(dir.path(), "oops").expect_err("directory target");
        assert!(error.to_string().contains("is a directory"));
    }

    #[cfg(unix)]
    #[test]
    fn functional_secure_write_sets_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memory.json");
        write_secure_text_atomic(&path, "{}").expect("write");
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
