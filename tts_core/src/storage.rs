use std::{
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::{artifact::AudioArtifact, cache_key::CacheKey, error::TtsError};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn storage_error(action: &str, path: &Path, err: &io::Error) -> TtsError {
    TtsError::StorageFailure(format!("{action} {}: {err}", path.display()))
}

/// Directory of materialized `<key>.wav` files.
#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Write the artifact to `<dir>/<key>.wav` unless that file already
    /// exists. Content is a pure function of the key, so an existing file is
    /// kept as is. New files are written to a temporary name and renamed into
    /// place, which keeps readers from seeing a partial file.
    pub async fn persist(&self, artifact: &AudioArtifact) -> Result<PathBuf, TtsError> {
        let path = self.path_for(&artifact.key);
        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "audio already materialized");
            return Ok(path);
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_error("cannot create audio directory", &self.dir, &e))?;

        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            artifact.key,
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = fs::write(&tmp, &artifact.bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(storage_error("cannot write audio file", &tmp, &e));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            warn!(path = %path.display(), error = %e, "failed to move audio file into place");
            let _ = fs::remove_file(&tmp).await;
            return Err(storage_error("cannot move audio file to", &path, &e));
        }

        info!(path = %path.display(), bytes = artifact.len(), "audio file written");
        Ok(path)
    }

    /// Read a materialized file by its `<key>.wav` name.
    ///
    /// Names that are not a rendered cache key are treated as absent, so
    /// nothing outside the store directory can be addressed.
    pub async fn load(&self, file_name: &str) -> Result<Option<Vec<u8>>, TtsError> {
        let Some(key) = file_name.strip_suffix(".wav").and_then(CacheKey::parse) else {
            return Ok(None);
        };
        let path = self.path_for(&key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("cannot read audio file", &path, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{speed::Speed, wav::AudioFormat};

    fn artifact(text: &str, bytes: &[u8]) -> AudioArtifact {
        AudioArtifact::new(
            CacheKey::build(text, Speed::Normal, 0.5, 0.6),
            AudioFormat::default(),
            bytes.to_vec(),
        )
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path().join("audio"));
        let artifact = artifact("hello", b"RIFFdata");

        let path = store.persist(&artifact).await.unwrap();
        assert_eq!(path, store.path_for(&artifact.key));
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFFdata");

        let loaded = store.load(&artifact.key.file_name()).await.unwrap();
        assert_eq!(loaded.as_deref(), Some(&b"RIFFdata"[..]));
    }

    #[tokio::test]
    async fn test_persist_is_idempotent_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path());
        let artifact = artifact("twice", b"same bytes");

        store.persist(&artifact).await.unwrap();
        store.persist(&artifact).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![artifact.key.file_name()]);
    }

    #[tokio::test]
    async fn test_load_unknown_and_malformed_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path());
        let unknown = CacheKey::build("never written", Speed::Slow, 0.5, 0.6);

        assert_eq!(store.load(&unknown.file_name()).await.unwrap(), None);
        assert_eq!(store.load("../secret.wav").await.unwrap(), None);
        assert_eq!(store.load(unknown.as_str()).await.unwrap(), None);
        assert_eq!(store.load("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_persist_reports_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the directory should be
        let blocked = dir.path().join("not_a_dir");
        std::fs::write(&blocked, b"x").unwrap();
        let store = AudioStore::new(&blocked);

        let err = store.persist(&artifact("x", b"y")).await.unwrap_err();
        assert!(matches!(err, TtsError::StorageFailure(_)));
    }
}
