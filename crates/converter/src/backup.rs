use std::path::{Path, PathBuf};
use log::debug;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use crate::error::ConvertError;

/// Path of the in-progress copy for a backup target
fn partial_path(backup_dir: &Path, file_name: &std::ffi::OsStr) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(file_name);
    name.push(".partial");
    backup_dir.join(name)
}

/// Copy `input` into `backup_dir`, keeping its file name
///
/// The bytes are written to a hidden `.partial` file and renamed into place
/// once the copy is flushed, so an interrupted copy never sits at the final
/// path. An existing backup with the same name is replaced.
pub async fn backup_file(input: &Path, backup_dir: &Path) -> Result<PathBuf, ConvertError> {
    let err = |source: std::io::Error| ConvertError::Backup {
        path: input.to_path_buf(),
        source,
    };

    let file_name = input.file_name().ok_or_else(|| {
        err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "input path has no file name",
        ))
    })?;

    fs::create_dir_all(backup_dir).await.map_err(err)?;

    let target = backup_dir.join(file_name);
    let partial = partial_path(backup_dir, file_name);

    if let Err(e) = copy_then_rename(input, &partial, &target).await {
        let _ = fs::remove_file(&partial).await;
        return Err(err(e));
    }

    debug!("Backed up {} to {}", input.display(), target.display());
    Ok(target)
}

async fn copy_then_rename(src: &Path, partial: &Path, target: &Path) -> std::io::Result<()> {
    let mut reader = fs::File::open(src).await?;
    let mut writer = fs::File::create(partial).await?;
    tokio::io::copy(&mut reader, &mut writer).await?;
    writer.flush().await?;
    writer.sync_all().await?;
    drop(writer);
    fs::rename(partial, target).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backup_copies_bytes_and_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("movie.avi");
        std::fs::write(&input, b"not really a video").unwrap();
        let backup_dir = dir.path().join("out").join("backup");

        let target = backup_file(&input, &backup_dir).await.unwrap();

        assert_eq!(target, backup_dir.join("movie.avi"));
        assert_eq!(std::fs::read(&target).unwrap(), b"not really a video");
        assert!(!partial_path(&backup_dir, input.file_name().unwrap()).exists());
    }

    #[tokio::test]
    async fn test_backup_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("movie.mkv");
        std::fs::write(&input, b"new").unwrap();
        let backup_dir = dir.path().join("backup");
        std::fs::create_dir_all(&backup_dir).unwrap();
        std::fs::write(backup_dir.join("movie.mkv"), b"old contents that are longer").unwrap();

        backup_file(&input, &backup_dir).await.unwrap();

        assert_eq!(std::fs::read(backup_dir.join("movie.mkv")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_missing_source_fails_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("gone.mp4");
        let backup_dir = dir.path().join("backup");

        let result = backup_file(&input, &backup_dir).await;

        assert!(matches!(result, Err(ConvertError::Backup { .. })));
        assert!(!backup_dir.join("gone.mp4").exists());
        assert!(!partial_path(&backup_dir, input.file_name().unwrap()).exists());
    }
}
