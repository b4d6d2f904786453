//! Zip extraction with a path-traversal guard.
//!
//! Every entry name is resolved against the destination before anything is
//! written. One entry that escapes the destination rejects the whole archive,
//! so a malicious bundle leaves nothing on disk.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ArchiveError;

/// Unpacks an archive into a directory.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `dest`, returning every path written.
    async fn unzip(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError>;
}

/// `ArchiveExtractor` backed by the `zip` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn unzip(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || unzip_blocking(&archive, &dest))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))?
    }
}

fn unzip_blocking(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;

    // First pass: resolve every entry, writing nothing.
    let mut plan = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        let target = resolve_entry(dest, entry.name()).ok_or_else(|| ArchiveError::IllegalPath {
            entry: entry.name().to_string(),
            dest: dest.to_path_buf(),
        })?;
        plan.push((i, target, entry.is_dir()));
    }

    fs::create_dir_all(dest)?;
    let mut written = Vec::with_capacity(plan.len());
    for (i, target, is_dir) in plan {
        if is_dir {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut entry = zip.by_index(i)?;
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
        }
        written.push(target);
    }

    debug!(archive = %archive.display(), entries = written.len(), "Archive extracted");
    Ok(written)
}

/// Join `name` onto `dest`, or `None` if the result is not strictly inside `dest`.
///
/// Resolution is lexical: `..` pops a component, absolute names and drive
/// prefixes are rejected outright.
fn resolve_entry(dest: &Path, name: &str) -> Option<PathBuf> {
    let name = name.replace('\\', "/");
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&name).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    let mut resolved = dest.to_path_buf();
    resolved.extend(parts);
    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn count_files(dir: &Path) -> usize {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }

    #[test]
    fn resolve_entry_accepts_nested_paths() {
        let dest = Path::new("/w/bundle");
        assert_eq!(
            resolve_entry(dest, "AG1_MO_DOC_20200731/p.pdf"),
            Some(PathBuf::from("/w/bundle/AG1_MO_DOC_20200731/p.pdf"))
        );
        assert_eq!(
            resolve_entry(dest, "a/../b.pdf"),
            Some(PathBuf::from("/w/bundle/b.pdf"))
        );
    }

    #[test]
    fn resolve_entry_rejects_escapes() {
        let dest = Path::new("/w/bundle");
        assert_eq!(resolve_entry(dest, "../../evil.txt"), None);
        assert_eq!(resolve_entry(dest, "a/../../evil.txt"), None);
        assert_eq!(resolve_entry(dest, "/etc/passwd"), None);
        assert_eq!(resolve_entry(dest, r"..\evil.txt"), None);
        assert_eq!(resolve_entry(dest, "."), None);
    }

    #[tokio::test]
    async fn unzip_extracts_all_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bundle.zip");
        build_zip(
            &archive,
            &[
                ("AG1_MO_DOC_20200731/P1_POLICY_SCHEDULE_20200731.pdf", "one"),
                ("AG1_MO_DOC_20200731/P1_DEBIT_NOTE_FOR_AGENT_20200731.pdf", "two"),
            ],
        );

        let dest = dir.path().join("bundle");
        let written = ZipExtractor.unzip(&archive, &dest).await.unwrap();
        assert_eq!(written.len(), 2);
        let body = std::fs::read_to_string(
            dest.join("AG1_MO_DOC_20200731/P1_POLICY_SCHEDULE_20200731.pdf"),
        )
        .unwrap();
        assert_eq!(body, "one");
    }

    #[tokio::test]
    async fn traversal_entry_rejects_whole_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        build_zip(
            &archive,
            &[("ok.txt", "fine"), ("../../evil.txt", "pwned")],
        );

        let dest = dir.path().join("out/evil");
        let result = ZipExtractor.unzip(&archive, &dest).await;
        assert!(matches!(result, Err(ArchiveError::IllegalPath { .. })));
        assert!(!dest.exists());
        assert!(!dir.path().join("evil.txt").exists());
        // Only the archive itself remains.
        assert_eq!(count_files(dir.path()), 1);
    }

    #[tokio::test]
    async fn garbage_input_is_malformed() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("junk.zip");
        std::fs::write(&archive, "not a zip").unwrap();
        let result = ZipExtractor.unzip(&archive, &dir.path().join("junk")).await;
        assert!(matches!(result, Err(ArchiveError::Malformed(_))));
    }
}
