//! Gzip-compressed tar packing.
//!
//! Sources are added by path with an explicit entry name, so the process
//! working directory is never consulted. The archive is written under a
//! temporary name and renamed into place once complete.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use tar::Builder;

use crate::config::CancelToken;
use crate::error::{BundleError, BundleResult};

fn create_tar_gz<W: Write>(writer: W) -> Builder<GzEncoder<W>> {
    let encoder = GzBuilder::new()
        .operating_system(255)
        .write(writer, Compression::default());

    let mut tar = Builder::new(encoder);
    tar.mode(tar::HeaderMode::Deterministic);
    tar
}

/// In-flight name for an archive being written.
pub(crate) fn partial_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Pack `source_dir/<name>` for every name into `archive`, each stored under
/// its bare file name. Returns the archive size in bytes.
///
/// `cancel` is checked between entries and once more right before the
/// rename; a cancelled pack leaves nothing behind.
pub fn pack_files(
    archive: &Path,
    source_dir: &Path,
    names: &[&str],
    cancel: &CancelToken,
) -> BundleResult<u64> {
    let partial = partial_path(archive);
    let result = write_archive(&partial, source_dir, names, cancel)
        .and_then(|()| cancel.check())
        .and_then(|()| {
            fs::rename(&partial, archive)
                .map_err(|e| BundleError::generation("failed to publish archive", e))
        })
        .and_then(|()| {
            fs::metadata(archive)
                .map(|m| m.len())
                .map_err(|e| BundleError::generation("failed to stat archive", e))
        });

    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

fn write_archive(
    partial: &Path,
    source_dir: &Path,
    names: &[&str],
    cancel: &CancelToken,
) -> BundleResult<()> {
    let file = File::create(partial)
        .map_err(|e| BundleError::generation("failed to create archive", e))?;
    let mut tar = create_tar_gz(BufWriter::new(file));

    for name in names {
        cancel.check()?;
        tar.append_path_with_name(source_dir.join(name), name)
            .map_err(|e| BundleError::generation(&format!("failed to add {}", name), e))?;
    }

    let encoder = tar
        .into_inner()
        .map_err(|e| BundleError::generation("failed to finish tar stream", e))?;
    let writer = encoder
        .finish()
        .map_err(|e| BundleError::generation("failed to finish gzip stream", e))?;
    let file = writer
        .into_inner()
        .map_err(|e| BundleError::generation("failed to flush archive", e.error()))?;
    file.sync_all()
        .map_err(|e| BundleError::generation("failed to sync archive", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_entries_use_bare_names() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a.json"), b"{}").unwrap();
        fs::write(src.path().join("b.csv"), b"id\n1\n").unwrap();

        let out = TempDir::new().unwrap();
        let archive = out.path().join("x.tar.gz");
        let size =
            pack_files(&archive, src.path(), &["a.json", "b.csv"], &CancelToken::new()).unwrap();
        assert_eq!(size, fs::metadata(&archive).unwrap().len());
        assert!(!partial_path(&archive).exists());

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(&archive).unwrap()));
        let mut seen = Vec::new();
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            seen.push((name, body));
        }
        assert_eq!(
            seen,
            vec![
                ("a.json".to_string(), "{}".to_string()),
                ("b.csv".to_string(), "id\n1\n".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_source_leaves_nothing_behind() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let archive = out.path().join("x.tar.gz");

        let err =
            pack_files(&archive, src.path(), &["missing.json"], &CancelToken::new()).unwrap_err();
        assert!(matches!(err, BundleError::GenerationFailure { .. }));
        assert!(!archive.exists());
        assert!(!partial_path(&archive).exists());
    }

    #[test]
    fn test_cancelled_pack_leaves_nothing_behind() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a.json"), b"{}").unwrap();
        let out = TempDir::new().unwrap();
        let archive = out.path().join("x.tar.gz");

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = pack_files(&archive, src.path(), &["a.json"], &cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
