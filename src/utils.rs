//! Utility functions for file operations and path manipulation

use crate::error::{Result, StagingError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// How to treat a target path that is already occupied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileCollisionAction {
    /// Pick a free sibling name: `file (1).ext`, `file (2).ext`, ...
    Rename,
    /// Refuse with [`StagingError::FileCollision`]
    Skip,
}

/// Get a unique path for a file, handling collisions according to `action`
///
/// # Examples
///
/// ```
/// use routed_dl::utils::{FileCollisionAction, get_unique_path};
/// use std::path::Path;
///
/// let path = Path::new("/tmp/clip.mp4");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// // If /tmp/clip.mp4 exists, returns /tmp/clip (1).mp4
/// // If that exists too, returns /tmp/clip (2).mp4, etc.
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    match action {
        FileCollisionAction::Skip => Err(StagingError::FileCollision {
            path: path.to_path_buf(),
            reason: "file already exists".to_string(),
        }
        .into()),
        FileCollisionAction::Rename => {
            let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
                StagingError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "cannot extract file stem".to_string(),
                }
            })?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().ok_or_else(|| StagingError::InvalidPath {
                path: path.to_path_buf(),
                reason: "cannot extract parent directory".to_string(),
            })?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(StagingError::FileCollision {
                path: path.to_path_buf(),
                reason: format!(
                    "could not find unique filename after {} attempts",
                    MAX_RENAME_ATTEMPTS
                ),
            }
            .into())
        }
    }
}

/// Move a file without replacing an existing target
///
/// Links `target` to `source` and then unlinks `source`. Creating the link
/// fails with [`ErrorKind::AlreadyExists`] when `target` is occupied, so two
/// concurrent moves to one name can never both succeed. Where links are not
/// possible (across devices, or filesystems without them) the file is copied
/// into a target opened with `create_new`, which refuses the same way.
pub async fn move_file_no_clobber(source: &Path, target: &Path) -> std::io::Result<()> {
    match tokio::fs::hard_link(source, target).await {
        Ok(()) => {
            // The file is in place; a leftover source goes with its scratch directory
            if let Err(e) = tokio::fs::remove_file(source).await {
                tracing::debug!(file = %source.display(), error = %e, "source kept after link");
            }
            Ok(())
        }
        Err(e) if matches!(e.kind(), ErrorKind::AlreadyExists | ErrorKind::NotFound) => Err(e),
        Err(e) => {
            tracing::debug!(
                source = %source.display(),
                target = %target.display(),
                error = %e,
                "link not possible, copying"
            );
            copy_then_remove(source, target).await
        }
    }
}

async fn copy_then_remove(source: &Path, target: &Path) -> std::io::Result<()> {
    let mut reader = tokio::fs::File::open(source).await?;
    let mut writer = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .await?;

    if let Err(e) = tokio::io::copy(&mut reader, &mut writer).await {
        drop(writer);
        let _ = tokio::fs::remove_file(target).await;
        return Err(e);
    }
    writer.sync_all().await?;
    drop(reader);

    tokio::fs::remove_file(source).await
}

/// Regular files directly inside `dir`, sorted by name
///
/// Subdirectories and symlinks are skipped.
pub async fn regular_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unique_path_for_free_name_is_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");

        assert_eq!(
            get_unique_path(&path, FileCollisionAction::Rename).unwrap(),
            path
        );
        assert_eq!(
            get_unique_path(&path, FileCollisionAction::Skip).unwrap(),
            path
        );
    }

    #[test]
    fn test_rename_adds_counter_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");
        fs::write(&path, "original").unwrap();

        let unique = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(unique, temp_dir.path().join("clip (1).mp4"));

        fs::write(&unique, "first").unwrap();
        let unique2 = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(unique2, temp_dir.path().join("clip (2).mp4"));
    }

    #[test]
    fn test_rename_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("README");
        fs::write(&path, "x").unwrap();

        let unique = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(unique, temp_dir.path().join("README (1)"));
    }

    #[test]
    fn test_rename_keeps_only_last_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("archive.tar.gz");
        fs::write(&path, "x").unwrap();

        let unique = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(unique, temp_dir.path().join("archive.tar (1).gz"));
    }

    #[test]
    fn test_skip_reports_collision() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");
        fs::write(&path, "original").unwrap();

        match get_unique_path(&path, FileCollisionAction::Skip) {
            Err(Error::Staging(StagingError::FileCollision { path: p, .. })) => {
                assert_eq!(p, path)
            }
            other => panic!("expected FileCollision, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_move_refuses_to_clobber() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("new.bin");
        let target = temp_dir.path().join("old.bin");
        fs::write(&source, "new").unwrap();
        fs::write(&target, "old").unwrap();

        let err = move_file_no_clobber(&source, &target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_move_relocates_file() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.mp4");
        let target = temp_dir.path().join("dest").join("a.mp4");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&source, "payload").unwrap();

        move_file_no_clobber(&source, &target).await.unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_copy_fallback_moves_content() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.bin");
        let target = temp_dir.path().join("b.bin");
        fs::write(&source, vec![7u8; 64 * 1024]).unwrap();

        copy_then_remove(&source, &target).await.unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&target).unwrap().len(), 64 * 1024);
    }

    #[tokio::test]
    async fn test_regular_files_skips_directories() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.jpg"), "").unwrap();
        fs::write(temp_dir.path().join("a.jpg"), "").unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        fs::write(temp_dir.path().join("nested").join("c.jpg"), "").unwrap();

        let files = regular_files(temp_dir.path()).await.unwrap();
        assert_eq!(
            files,
            vec![temp_dir.path().join("a.jpg"), temp_dir.path().join("b.jpg")]
        );
    }

    #[tokio::test]
    async fn test_concurrent_moves_to_one_name_never_clobber() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("clip.mp4");

        for round in 0..50 {
            let a = temp_dir.path().join(format!("a-{round}"));
            let b = temp_dir.path().join(format!("b-{round}"));
            fs::write(&a, "A").unwrap();
            fs::write(&b, "B").unwrap();

            let (first, second) = tokio::join!(
                move_file_no_clobber(&a, &target),
                move_file_no_clobber(&b, &target)
            );

            let winner = match (first, second) {
                (Ok(()), Err(e)) => {
                    assert_eq!(e.kind(), ErrorKind::AlreadyExists);
                    assert!(b.exists(), "losing source is left in place");
                    "A"
                }
                (Err(e), Ok(())) => {
                    assert_eq!(e.kind(), ErrorKind::AlreadyExists);
                    assert!(a.exists(), "losing source is left in place");
                    "B"
                }
                other => panic!("round {round}: expected exactly one move, got {other:?}"),
            };
            assert_eq!(fs::read_to_string(&target).unwrap(), winner);
            fs::remove_file(&target).unwrap();
        }
    }
}
