//! Input staging: validate a user-supplied PSD and copy it into `upload_dir`.
//!
//! Checks run cheapest first (existence, extension, size, magic bytes) so
//! an obviously wrong file is rejected before anything is copied. The staged
//! copy is what a job owns; the orchestrator deletes it when the job ends.

use crate::config::ConversionConfig;
use crate::error::{ParseError, Psd2FigmaError};
use crate::pipeline::psd::PSD_SIGNATURE;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use uuid::Uuid;

const ACCEPTED_EXTENSIONS: [&str; 2] = ["psd", "psb"];

/// Validate `path` and copy it to `<upload_dir>/<uuid>-<file name>`.
///
/// Returns the staged path.
pub async fn stage_upload(path: &Path, config: &ConversionConfig) -> Result<PathBuf, Psd2FigmaError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => {
            return Err(Psd2FigmaError::InvalidInput {
                path: path.to_path_buf(),
                reason: "not a regular file".into(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Psd2FigmaError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(Psd2FigmaError::Internal(format!("{}: {}", path.display(), e))),
    };

    if !has_accepted_extension(path) {
        return Err(Psd2FigmaError::InvalidInput {
            path: path.to_path_buf(),
            reason: "only .psd and .psb files are accepted".into(),
        });
    }

    if metadata.len() > config.max_file_size {
        return Err(Psd2FigmaError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max: config.max_file_size,
        });
    }

    let magic = read_magic(path).await?;
    if &magic != PSD_SIGNATURE {
        return Err(ParseError::NotAPsd { magic }.into());
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .map_err(|e| Psd2FigmaError::Internal(format!("{}: {}", config.upload_dir.display(), e)))?;
    let staged = config
        .upload_dir
        .join(format!("{}-{}", Uuid::new_v4(), file_name));
    tokio::fs::copy(path, &staged)
        .await
        .map_err(|e| Psd2FigmaError::Internal(format!("{}: {}", staged.display(), e)))?;

    info!(
        "Staged {} ({} bytes) as {}",
        path.display(),
        metadata.len(),
        staged.display()
    );
    Ok(staged)
}

fn has_accepted_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ACCEPTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// First four bytes, zero-padded when the file is shorter.
async fn read_magic(path: &Path) -> Result<[u8; 4], Psd2FigmaError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Psd2FigmaError::Internal(format!("{}: {}", path.display(), e)))?;
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        let n = file
            .read(&mut magic[filled..])
            .await
            .map_err(|e| Psd2FigmaError::Internal(format!("{}: {}", path.display(), e)))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    debug!("Magic bytes of {}: {:?}", path.display(), magic);
    Ok(magic)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> ConversionConfig {
        ConversionConfig::builder()
            .upload_dir(dir.join("uploads"))
            .max_file_size(64)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = stage_upload(&tmp.path().join("nope.psd"), &config(tmp.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, Psd2FigmaError::FileNotFound { .. }));
    }

    #[test]
    fn directory_is_not_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("layers.psd");
        std::fs::create_dir(&dir).unwrap();
        let err = tokio_test::block_on(stage_upload(&dir, &config(tmp.path()))).unwrap_err();
        assert!(matches!(err, Psd2FigmaError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn wrong_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("design.png");
        std::fs::write(&path, b"8BPS").unwrap();
        let err = stage_upload(&path, &config(tmp.path())).await.unwrap_err();
        assert!(matches!(err, Psd2FigmaError::InvalidInput { .. }));
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn too_large() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("big.psd");
        std::fs::write(&path, vec![b'8'; 65]).unwrap();
        let err = stage_upload(&path, &config(tmp.path())).await.unwrap_err();
        assert!(matches!(err, Psd2FigmaError::FileTooLarge { size: 65, max: 64, .. }));
    }

    #[tokio::test]
    async fn bad_magic() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fake.PSD");
        std::fs::write(&path, b"%PDF-1.7").unwrap();
        let err = stage_upload(&path, &config(tmp.path())).await.unwrap_err();
        assert!(matches!(
            err,
            Psd2FigmaError::Parse(ParseError::NotAPsd { magic }) if &magic == b"%PDF"
        ));
    }

    #[tokio::test]
    async fn copies_into_upload_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Hero.psb");
        std::fs::write(&path, b"8BPS\x00\x02").unwrap();
        let cfg = config(tmp.path());
        let staged = stage_upload(&path, &cfg).await.unwrap();
        assert!(staged.starts_with(&cfg.upload_dir));
        let name = staged.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("-Hero.psb"), "{name}");
        assert_eq!(std::fs::read(&staged).unwrap(), b"8BPS\x00\x02");
        assert!(path.exists());
    }
}
