//! Filesystem-backed bundle registry.
//!
//! # Layout
//!
//! ```text
//! {storage_dir}/
//!   {bundle_id}.tar.gz        # the archive (pending)
//!   {bundle_id}.tar.gz.done   # zero-byte marker (done, purgeable)
//!   {bundle_id}.tar.gz.tmp    # archive still being written, never listed
//! ```
//!
//! There is no index: the directory listing is the state. Scans are not
//! transactional, so files may vanish between a scan and a later action;
//! every delete tolerates that.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{BundleError, BundleResult};

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
pub const MARKER_SUFFIX: &str = ".tar.gz.done";

/// Bundle ids found in one directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundlesByState {
    /// Archive present, no marker.
    pub pending: Vec<String>,
    /// Marker present.
    pub done: Vec<String>,
    /// Archive and marker present.
    pub purgeable: Vec<String>,
}

/// Listing entry exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleState {
    pub uuid: String,
    pub processed: bool,
}

impl BundlesByState {
    /// Pending and done bundles as listing entries.
    pub fn states(&self) -> Vec<BundleState> {
        let pending = self.pending.iter().map(|uuid| BundleState {
            uuid: uuid.clone(),
            processed: false,
        });
        let done = self.done.iter().map(|uuid| BundleState {
            uuid: uuid.clone(),
            processed: true,
        });
        pending.chain(done).collect()
    }
}

/// Reject ids that are empty or could escape the storage directory.
pub fn validate_bundle_id(bundle_id: &str) -> BundleResult<()> {
    let valid = !bundle_id.is_empty()
        && bundle_id.len() <= 128
        && bundle_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BundleError::InvalidBundleId {
            bundle_id: bundle_id.to_string(),
        })
    }
}

/// Classify directory entry names into bundle states.
///
/// Ids keep the order in which their files were discovered. A marker without
/// an archive is reported as done only, and logged as an orphan.
pub fn classify<I, S>(file_names: I) -> BundlesByState
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut archives = Vec::new();
    let mut markers = Vec::new();
    for name in file_names {
        let name = name.as_ref();
        if let Some(id) = name.strip_suffix(MARKER_SUFFIX) {
            markers.push(id.to_string());
        } else if let Some(id) = name.strip_suffix(ARCHIVE_SUFFIX) {
            archives.push(id.to_string());
        }
    }

    let archive_set: HashSet<&str> = archives.iter().map(String::as_str).collect();
    let marker_set: HashSet<&str> = markers.iter().map(String::as_str).collect();

    let mut state = BundlesByState::default();
    for id in &markers {
        if archive_set.contains(id.as_str()) {
            state.purgeable.push(id.clone());
        } else {
            warn!(bundle_id = %id, "orphan marker without archive");
        }
    }
    state.pending = archives
        .iter()
        .filter(|id| !marker_set.contains(id.as_str()))
        .cloned()
        .collect();
    state.done = markers;
    state
}

/// Bundle registry over one storage directory.
#[derive(Debug, Clone)]
pub struct BundleRegistry {
    dir: PathBuf,
}

impl BundleRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the archive for `bundle_id`. Existence is not checked.
    pub fn locate(&self, bundle_id: &str) -> BundleResult<PathBuf> {
        validate_bundle_id(bundle_id)?;
        Ok(self.dir.join(format!("{}{}", bundle_id, ARCHIVE_SUFFIX)))
    }

    /// Path of the done marker for `bundle_id`.
    pub fn marker_path(&self, bundle_id: &str) -> BundleResult<PathBuf> {
        validate_bundle_id(bundle_id)?;
        Ok(self.dir.join(format!("{}{}", bundle_id, MARKER_SUFFIX)))
    }

    /// Archive path for a lookup. An id that fails validation cannot name a
    /// stored bundle, so it is reported as `NotFound`.
    fn lookup(&self, bundle_id: &str) -> BundleResult<PathBuf> {
        self.locate(bundle_id).map_err(|_| BundleError::NotFound {
            bundle_id: bundle_id.to_string(),
        })
    }

    /// Whether an archive exists for `bundle_id`. Invalid ids never exist.
    pub async fn exists(&self, bundle_id: &str) -> BundleResult<bool> {
        let Ok(path) = self.locate(bundle_id) else {
            return Ok(false);
        };
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BundleError::io("failed to stat archive", e)),
        }
    }

    /// Read the whole archive; `NotFound` when it does not exist.
    pub async fn read(&self, bundle_id: &str) -> BundleResult<Vec<u8>> {
        let path = self.lookup(bundle_id)?;
        fs::read(&path)
            .await
            .map_err(|e| self.not_found_or_io(bundle_id, "failed to read archive", e))
    }

    /// Current archive size in bytes; `NotFound` when it does not exist.
    pub async fn size(&self, bundle_id: &str) -> BundleResult<u64> {
        let path = self.lookup(bundle_id)?;
        fs::metadata(&path)
            .await
            .map(|meta| meta.len())
            .map_err(|e| self.not_found_or_io(bundle_id, "failed to stat archive", e))
    }

    /// Create the done marker. Touching an existing marker is a no-op.
    pub async fn mark_done(&self, bundle_id: &str) -> BundleResult<()> {
        let marker = self.marker_path(bundle_id)?;
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&marker)
            .await
            .map_err(|e| BundleError::io("failed to create done marker", e))?;
        debug!(bundle_id, "bundle marked done");
        Ok(())
    }

    /// Scan the storage directory once. A missing directory holds no bundles.
    pub async fn classify_all(&self) -> BundleResult<BundlesByState> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "storage directory does not exist");
                return Ok(BundlesByState::default());
            }
            Err(e) => return Err(BundleError::io("failed to list storage directory", e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BundleError::io("failed to list storage directory", e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(classify(names))
    }

    /// Delete archive and marker of every id. Files that are already gone
    /// are skipped. Returns the number of archives removed.
    pub async fn purge(&self, bundle_ids: &[String]) -> usize {
        let mut removed = 0;
        for bundle_id in bundle_ids {
            let (archive, marker) = match (self.locate(bundle_id), self.marker_path(bundle_id)) {
                (Ok(archive), Ok(marker)) => (archive, marker),
                _ => {
                    warn!(bundle_id = %bundle_id, "skipping purge of invalid bundle id");
                    continue;
                }
            };
            if remove_if_present(&archive).await {
                removed += 1;
            }
            remove_if_present(&marker).await;
            debug!(bundle_id = %bundle_id, "bundle purged");
        }
        removed
    }

    fn not_found_or_io(&self, bundle_id: &str, context: &str, err: std::io::Error) -> BundleError {
        if err.kind() == ErrorKind::NotFound {
            BundleError::NotFound {
                bundle_id: bundle_id.to_string(),
            }
        } else {
            BundleError::io(context, err)
        }
    }
}

async fn remove_if_present(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove bundle file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const A: &str = "00000000000000000000000000000000";
    const B: &str = "11111111111111111111111111111111";
    const C: &str = "22222222222222222222222222222222";

    fn create_test_registry() -> (BundleRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        (BundleRegistry::new(temp_dir.path()), temp_dir)
    }

    #[test]
    fn test_classify_by_state() {
        let names = [
            format!("{A}.tar.gz.done"),
            format!("{B}.tar.gz"),
            format!("{B}.tar.gz.done"),
            format!("{C}.tar.gz"),
        ];
        let state = classify(&names);
        assert_eq!(state.purgeable, vec![B]);
        assert_eq!(state.done, vec![A, B]);
        assert_eq!(state.pending, vec![C]);
    }

    #[test]
    fn test_classify_ignores_unrelated_files() {
        let names = [
            format!("{A}.tar.gz.tmp"),
            "README".to_string(),
            format!("{B}.json"),
        ];
        assert_eq!(classify(&names), BundlesByState::default());
    }

    #[test]
    fn test_states_listing() {
        let state = BundlesByState {
            pending: vec![C.to_string()],
            done: vec![A.to_string(), B.to_string()],
            purgeable: vec![B.to_string()],
        };
        let mut listed = state.states();
        listed.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        assert_eq!(
            listed,
            vec![
                BundleState { uuid: A.to_string(), processed: true },
                BundleState { uuid: B.to_string(), processed: true },
                BundleState { uuid: C.to_string(), processed: false },
            ]
        );
    }

    #[test]
    fn test_validate_bundle_id() {
        assert!(validate_bundle_id(A).is_ok());
        assert!(validate_bundle_id("foo").is_ok());
        for bad in ["", "../etc/passwd", "a/b", "a.b", "id with space"] {
            assert!(
                matches!(
                    validate_bundle_id(bad),
                    Err(BundleError::InvalidBundleId { .. })
                ),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn test_locate_is_deterministic() {
        let registry = BundleRegistry::new("/bundles");
        assert_eq!(
            registry.locate(A).unwrap(),
            PathBuf::from(format!("/bundles/{A}.tar.gz"))
        );
        assert_eq!(
            registry.marker_path(A).unwrap(),
            PathBuf::from(format!("/bundles/{A}.tar.gz.done"))
        );
    }

    #[tokio::test]
    async fn test_lifecycle_pending_done_purged() {
        let (registry, _temp_dir) = create_test_registry();
        std::fs::write(registry.locate(A).unwrap(), b"archive").unwrap();

        let state = registry.classify_all().await.unwrap();
        assert_eq!(state.pending, vec![A]);
        assert!(state.done.is_empty());

        registry.mark_done(A).await.unwrap();
        registry.mark_done(A).await.unwrap();
        let state = registry.classify_all().await.unwrap();
        assert!(state.pending.is_empty());
        assert_eq!(state.purgeable, vec![A]);

        assert_eq!(registry.purge(&state.purgeable).await, 1);
        assert_eq!(
            registry.classify_all().await.unwrap(),
            BundlesByState::default()
        );
    }

    #[tokio::test]
    async fn test_purge_pending_and_missing() {
        let (registry, _temp_dir) = create_test_registry();
        std::fs::write(registry.locate(B).unwrap(), b"archive").unwrap();

        let ids = vec![B.to_string(), C.to_string()];
        assert_eq!(registry.purge(&ids).await, 1);
        assert!(!registry.exists(B).await.unwrap());
        // second purge finds nothing and does not fail
        assert_eq!(registry.purge(&ids).await, 0);
    }

    #[tokio::test]
    async fn test_read_and_size_not_found() {
        let (registry, _temp_dir) = create_test_registry();
        assert!(registry.read(A).await.unwrap_err().is_not_found());
        assert!(registry.size(A).await.unwrap_err().is_not_found());

        std::fs::write(registry.locate(A).unwrap(), vec![7u8; 1000]).unwrap();
        assert_eq!(registry.size(A).await.unwrap(), 1000);
        assert_eq!(registry.read(A).await.unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn test_lookups_treat_invalid_ids_as_missing() {
        let (registry, temp_dir) = create_test_registry();
        std::fs::write(temp_dir.path().join("passwd"), b"secret").unwrap();

        for bad in ["../passwd", "bad.id", ""] {
            assert!(!registry.exists(bad).await.unwrap());
            assert!(registry.read(bad).await.unwrap_err().is_not_found());
            assert!(registry.size(bad).await.unwrap_err().is_not_found());
        }
        assert!(matches!(
            registry.locate("bad.id"),
            Err(BundleError::InvalidBundleId { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_storage_dir_is_empty() {
        let (_, temp_dir) = create_test_registry();
        let registry = BundleRegistry::new(temp_dir.path().join("absent"));
        assert_eq!(
            registry.classify_all().await.unwrap(),
            BundlesByState::default()
        );
    }
}
