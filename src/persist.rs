use crate::snapshot::Snapshot;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("не удалось создать каталог {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось сериализовать снимок: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("не удалось записать временный файл в {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось заменить {path}: {source}")]
    Replace {
        path: String,
        source: std::io::Error,
    },
}

/// Writes the latest snapshot to `<dir>/<file>`. The new content goes to a temporary file in the
/// same directory which is then renamed over the target, so readers see either the previous or
/// the new document, never a torn one.
#[derive(Debug, Clone)]
pub struct Persister {
    dir: PathBuf,
    target: PathBuf,
}

impl Persister {
    pub fn new(dir: impl AsRef<Path>, file_name: &str) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let target = dir.join(file_name);
        Self { dir, target }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Best-effort: failures are logged and otherwise ignored.
    pub fn save(&self, snapshot: &Snapshot) {
        if let Err(err) = self.try_save(snapshot) {
            warn!(path = %self.target.display(), error = %err, "снимок не сохранён на диск");
        }
    }

    pub fn try_save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).map_err(|source| PersistError::CreateDir {
            path: self.dir.display().to_string(),
            source,
        })?;

        let body = serde_json::to_vec_pretty(snapshot)?;

        let write_err = |source| PersistError::Write {
            path: self.dir.display().to_string(),
            source,
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".sysdash-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(write_err)?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))
                .map_err(write_err)?;
        }

        tmp.persist(&self.target)
            .map_err(|err| PersistError::Replace {
                path: self.target.display().to_string(),
                source: err.error,
            })?;
        Ok(())
    }
}
