//! Diagnostic artifact storage
//!
//! Artifacts are named `<prefix>-<scenario>[-<case>]-attempt<N>-<unix-ms>.<ext>` and are
//! never overwritten or cleaned up by the harness.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::E2eResult;

/// A file captured as failure evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    /// Absent when the file could not be read back after capture
    pub sha256: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    reserved: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> E2eResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            reserved: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pick a fresh path for an artifact. No two calls return the same path, and no
    /// returned path exists on disk at the time of the call.
    pub fn reserve(&self, prefix: &str, scenario: &str, case: Option<&str>, attempt: u32, ext: &str) -> PathBuf {
        let case = case.map(|c| format!("-{}", slug(c))).unwrap_or_default();
        let stamp = chrono::Utc::now().timestamp_millis();
        let base = format!("{}-{}{}-attempt{}-{}", prefix, slug(scenario), case, attempt, stamp);

        let mut reserved = self.reserved.lock();
        let mut path = self.dir.join(format!("{}.{}", base, ext));
        let mut n = 1;
        while path.exists() || reserved.contains(&path) {
            path = self.dir.join(format!("{}-{}.{}", base, n, ext));
            n += 1;
        }
        reserved.insert(path.clone());

        debug!("Reserved artifact {}", path.display());
        path
    }

    /// Describe a file that was written to a reserved path. Once the file exists its
    /// reservation is released; the file itself keeps the name taken.
    pub fn record(&self, path: &Path) -> Artifact {
        if path.exists() {
            self.reserved.lock().remove(path);
        }
        let sha256 = match hash_file(path) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Could not hash artifact {}: {}", path.display(), e);
                None
            }
        };
        Artifact {
            path: path.to_path_buf(),
            sha256,
        }
    }

    /// All artifact files currently in the store directory
    pub fn list(&self) -> E2eResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Hash a file using SHA256
fn hash_file(path: &Path) -> E2eResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase, filesystem-safe form of a scenario or case name
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("C1.1 - Login with invalid credentials"), "c1-1-login-with-invalid-credentials");
        assert_eq!(slug("locked_out_user"), "locked_out_user");
        assert_eq!(slug(""), "unnamed");
        assert_eq!(slug("  "), "unnamed");
    }

    #[test]
    fn test_reserve_is_unique_within_same_millisecond() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let a = store.reserve("assertion-error", "C2 - cart", None, 0, "png");
        let b = store.reserve("assertion-error", "C2 - cart", None, 0, "png");
        assert_ne!(a, b);
    }

    #[test]
    fn test_record_releases_reservation_but_name_stays_taken() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let first = store.reserve("timeout-error", "C2 - cart", None, 1, "png");
        std::fs::write(&first, b"png").unwrap();

        let artifact = store.record(&first);
        assert!(artifact.sha256.is_some());
        assert!(store.reserved.lock().is_empty());

        let second = store.reserve("timeout-error", "C2 - cart", None, 1, "png");
        assert_ne!(first, second);
    }

    #[test]
    fn test_failed_capture_keeps_reservation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let path = store.reserve("navigation-error", "C1 - login", None, 0, "png");

        let artifact = store.record(&path);
        assert!(artifact.sha256.is_none());
        assert!(store.reserved.lock().contains(&path));
    }

    #[test]
    fn test_reserve_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let first = store.reserve("navigation-error", "login", Some("case one"), 1, "png");
        std::fs::write(&first, b"png").unwrap();
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("navigation-error-login-case-one-attempt1-"));

        let fresh = ArtifactStore::new(dir.path()).unwrap();
        let second = fresh.reserve("navigation-error", "login", Some("case one"), 1, "png");
        assert_ne!(first, second);
    }

    #[test]
    fn test_record_hashes_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let path = store.reserve("timeout-error", "x", None, 0, "png");
        std::fs::write(&path, b"abc").unwrap();
        let artifact = store.record(&path);
        assert_eq!(
            artifact.sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(store.list().unwrap(), vec![path]);
    }
}
