//! Distribution runs.
//!
//! A run takes a batch of files by URL and, inside a private workspace:
//! downloads them all, turns images into PDFs, PGP-encrypts every file to a
//! sibling `.pgp`, uploads the `.pgp` files to the deploy folder for the
//! target environment and finally pings the caller's notify URL. Each stage
//! fans out one task per file and waits for all of them; a file that fails a
//! stage is dropped from the later ones.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::config::{DeployDirs, DeployEnv, NotifyPolicy, PipelineConfig};
use crate::distribution::notify::{NotifyOutcome, notify_with_retry};
use crate::error::DistributionError;
use crate::storage::{Encryption, Rasterizer, RemoteStorage};
use crate::worker::run_unbounded;
use crate::workspace::Workspace;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "gif", "jpg", "bmp", "jpeg"];

/// A file to distribute: local name plus where to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub url: String,
}

/// What a run achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionReport {
    pub requested: usize,
    pub downloaded: usize,
    pub encrypted: usize,
    /// Remote paths written, in input order.
    pub uploaded: Vec<String>,
    pub notify: Option<NotifyOutcome>,
}

/// Whether `path` looks like an image by extension.
pub fn is_image(path: &Path) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|candidate| ext.contains(candidate))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Final component of a caller-supplied name; rejects names with none.
fn safe_file_name(name: &str) -> Result<&str, DistributionError> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| DistributionError::InvalidFileName(name.to_string()))
}

/// Keep the first file for each workspace name; later files that would land
/// on the same path are dropped. Names with no final component pass through
/// and are rejected at download.
fn drop_duplicate_names(files: Vec<RemoteFile>) -> Vec<RemoteFile> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .filter(|file| match safe_file_name(&file.name) {
            Ok(name) if !seen.insert(name.to_string()) => {
                warn!(name = %file.name, url = %file.url, "Duplicate file name in batch, skipping");
                false
            }
            _ => true,
        })
        .collect()
}

pub struct Distributor {
    http: reqwest::Client,
    storage: Arc<dyn RemoteStorage>,
    encryption: Arc<dyn Encryption>,
    rasterizer: Arc<dyn Rasterizer>,
    temp_dir: PathBuf,
    deploy_dirs: DeployDirs,
    notify: NotifyPolicy,
    span: Span,
}

impl Distributor {
    pub fn new(
        config: &PipelineConfig,
        storage: Arc<dyn RemoteStorage>,
        encryption: Arc<dyn Encryption>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            storage,
            encryption,
            rasterizer,
            temp_dir: config.temp_dir.clone(),
            deploy_dirs: config.deploy_dirs.clone(),
            notify: config.notify,
            span: info_span!("distribution"),
        }
    }

    /// Run one distribution batch.
    ///
    /// Only workspace creation fails the run; per-file failures are logged
    /// and reflected in the report. The workspace is removed before
    /// returning.
    pub async fn process(
        &self,
        files: Vec<RemoteFile>,
        public_key: &str,
        env: DeployEnv,
        notify_url: Option<&str>,
    ) -> Result<DistributionReport, DistributionError> {
        let run_span = info_span!(parent: &self.span, "run", env = %env, files = files.len());
        async {
            let workspace = Workspace::create(&self.temp_dir).await?;
            let report = self.run_stages(&workspace, files, public_key, env, notify_url).await;
            workspace.cleanup().await;
            info!(
                downloaded = report.downloaded,
                encrypted = report.encrypted,
                uploaded = report.uploaded.len(),
                "Distribution run finished"
            );
            Ok::<_, DistributionError>(report)
        }
        .instrument(run_span)
        .await
    }

    async fn run_stages(
        &self,
        workspace: &Workspace,
        files: Vec<RemoteFile>,
        public_key: &str,
        env: DeployEnv,
        notify_url: Option<&str>,
    ) -> DistributionReport {
        let requested = files.len();
        let files = drop_duplicate_names(files);

        let http = self.http.clone();
        let dir = workspace.path().to_path_buf();
        let downloaded = run_unbounded("download", files, move |file| {
            let http = http.clone();
            let dir = dir.clone();
            async move { download(&http, &dir, file).await }
        })
        .await;

        let encryption = Arc::clone(&self.encryption);
        let rasterizer = Arc::clone(&self.rasterizer);
        let key: Arc<str> = Arc::from(public_key);
        let downloaded_count = downloaded.completed.len();
        let encrypted = run_unbounded("encrypt", downloaded.completed, move |path| {
            let encryption = Arc::clone(&encryption);
            let rasterizer = Arc::clone(&rasterizer);
            let key = Arc::clone(&key);
            async move { encrypt_file(encryption.as_ref(), rasterizer.as_ref(), &key, path).await }
        })
        .await;

        let storage = Arc::clone(&self.storage);
        let folder = self.deploy_dirs.resolve(env).to_string();
        let encrypted_count = encrypted.completed.len();
        let uploaded = run_unbounded("upload", encrypted.completed, move |path| {
            let storage = Arc::clone(&storage);
            let folder = folder.clone();
            async move { upload(storage.as_ref(), &folder, path).await }
        })
        .await;

        let notify = match notify_url.filter(|url| !url.is_empty()) {
            Some(url) => Some(notify_with_retry(&self.http, url, self.notify).await),
            None => None,
        };

        DistributionReport {
            requested,
            downloaded: downloaded_count,
            encrypted: encrypted_count,
            uploaded: uploaded.completed,
            notify,
        }
    }
}

async fn download(http: &reqwest::Client, dir: &Path, file: RemoteFile) -> Result<PathBuf, DistributionError> {
    let name = safe_file_name(&file.name)?;
    let failed = |e: reqwest::Error| DistributionError::Download {
        url: file.url.clone(),
        reason: e.to_string(),
    };

    let resp = http
        .get(&file.url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(failed)?;
    let bytes = resp.bytes().await.map_err(failed)?;

    let path = dir.join(name);
    tokio::fs::write(&path, &bytes).await?;
    debug!(url = %file.url, path = %path.display(), size = bytes.len(), "Downloaded");
    Ok(path)
}

/// Encrypt `path` (rasterized first if it is an image) to a sibling `.pgp`.
async fn encrypt_file(
    encryption: &dyn Encryption,
    rasterizer: &dyn Rasterizer,
    public_key: &str,
    path: PathBuf,
) -> Result<PathBuf, DistributionError> {
    let (source, plaintext) = if is_image(&path) {
        let pdf = rasterizer
            .image_to_pdf(&path)
            .await
            .map_err(|reason| DistributionError::Rasterize {
                path: path.clone(),
                reason,
            })?;
        (with_suffix(&path, ".pdf"), pdf)
    } else {
        let bytes = tokio::fs::read(&path).await?;
        (path, bytes)
    };

    let ciphertext = encryption.encrypt(plaintext, public_key).await?;
    let out = with_suffix(&source, ".pgp");
    tokio::fs::write(&out, ciphertext).await?;
    debug!(path = %out.display(), "Encrypted");
    Ok(out)
}

async fn upload(storage: &dyn RemoteStorage, folder: &str, path: PathBuf) -> Result<String, DistributionError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DistributionError::InvalidFileName(path.display().to_string()))?;
    let remote = format!("{}/{name}", folder.trim_end_matches('/'));

    let bytes = tokio::fs::read(&path).await?;
    storage.put(&remote, bytes).await?;
    debug!(remote = %remote, "Uploaded");
    Ok(remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_detection_by_extension() {
        assert!(is_image(Path::new("scan.png")));
        assert!(is_image(Path::new("scan.JPG")));
        assert!(is_image(Path::new("scan.jpeg")));
        assert!(is_image(Path::new("dir/photo.bmp")));
        assert!(is_image(Path::new("anim.gif")));
        assert!(!is_image(Path::new("schedule.pdf")));
        assert!(!is_image(Path::new("README")));
        // The directory name does not count.
        assert!(!is_image(Path::new("png/report.txt")));
    }

    #[test]
    fn output_names_append_suffixes() {
        let pdf = with_suffix(Path::new("/w/scan.png"), ".pdf");
        assert_eq!(pdf, PathBuf::from("/w/scan.png.pdf"));
        assert_eq!(with_suffix(&pdf, ".pgp"), PathBuf::from("/w/scan.png.pdf.pgp"));
    }

    #[test]
    fn file_names_are_confined() {
        assert_eq!(safe_file_name("index.csv").unwrap(), "index.csv");
        assert_eq!(safe_file_name("../../etc/passwd").unwrap(), "passwd");
        assert!(matches!(
            safe_file_name(".."),
            Err(DistributionError::InvalidFileName(_))
        ));
        assert!(safe_file_name("").is_err());
    }

    #[test]
    fn duplicate_names_keep_first() {
        let file = |name: &str, url: &str| RemoteFile {
            name: name.to_string(),
            url: url.to_string(),
        };
        let kept = drop_duplicate_names(vec![
            file("a/x.pdf", "http://h/1"),
            file("b/x.pdf", "http://h/2"),
            file("x.pdf", "http://h/3"),
            file("y.pdf", "http://h/4"),
            file("..", "http://h/5"),
        ]);
        let urls: Vec<_> = kept.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(urls, vec!["http://h/1", "http://h/4", "http://h/5"]);
    }
}
