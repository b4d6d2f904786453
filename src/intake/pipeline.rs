//! Intake runs.
//!
//! One run drains the remote drop folder into a fresh workspace and turns
//! whatever arrived into webhook callbacks:
//!
//! 1. Download every remote file (bounded)
//! 2. Decrypt `*.pgp` in place, dropping the suffix (bounded)
//! 3. Unzip `*.zip` into a folder named after the archive (bounded)
//! 4. Classify, group by policy, OCR the schedules
//! 5. Upload each grouped document to the webhook
//!
//! The workspace is removed when the run ends, whether it succeeded or not.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::archive::ArchiveExtractor;
use crate::config::PipelineConfig;
use crate::error::{IntakeError, Result};
use crate::intake::classifier::classify_all;
use crate::intake::grouper::{PolicyGroup, PolicyGrouper};
use crate::ocr::FieldExtractor;
use crate::storage::{Encryption, RemoteStorage};
use crate::webhook::WebhookClient;
use crate::worker::run_bounded;
use crate::workspace::Workspace;

/// Counts and groups produced by one intake run.
#[derive(Debug, Clone, Default)]
pub struct IntakeReport {
    pub listed: usize,
    pub downloaded: usize,
    pub decrypted: usize,
    pub extracted: usize,
    pub classified: usize,
    pub groups: Vec<PolicyGroup>,
    /// Webhook uploads that were accepted.
    pub delivered: usize,
}

pub struct IntakePipeline {
    config: PipelineConfig,
    storage: Arc<dyn RemoteStorage>,
    encryption: Arc<dyn Encryption>,
    archives: Arc<dyn ArchiveExtractor>,
    grouper: PolicyGrouper,
    webhook: WebhookClient,
    span: Span,
}

impl IntakePipeline {
    pub fn new(
        config: PipelineConfig,
        storage: Arc<dyn RemoteStorage>,
        encryption: Arc<dyn Encryption>,
        archives: Arc<dyn ArchiveExtractor>,
        extractor: Arc<dyn FieldExtractor>,
    ) -> Result<Self> {
        let webhook = WebhookClient::new(&config.webhook)?;
        Ok(Self {
            span: info_span!("intake", drop_folder = %config.download_dir),
            config,
            storage,
            encryption,
            archives,
            grouper: PolicyGrouper::new(extractor),
            webhook,
        })
    }

    /// Run one intake pass over the remote drop folder.
    pub async fn run(&self) -> std::result::Result<IntakeReport, IntakeError> {
        async {
            let workspace = Workspace::create(&self.config.temp_dir).await?;
            let result = self.run_in(&workspace).await;
            workspace.cleanup().await;

            match &result {
                Ok(report) => info!(
                    downloaded = report.downloaded,
                    groups = report.groups.len(),
                    delivered = report.delivered,
                    "Intake run finished"
                ),
                Err(e) => warn!(error = %e, "Intake run aborted"),
            }
            result
        }
        .instrument(self.span.clone())
        .await
    }

    async fn run_in(&self, workspace: &Workspace) -> std::result::Result<IntakeReport, IntakeError> {
        let mut report = IntakeReport::default();

        let remote_files = self.storage.list_files(&self.config.download_dir).await?;
        report.listed = remote_files.len();
        info!(count = report.listed, "Listed drop folder");

        report.downloaded = self.download_all(workspace.path(), remote_files).await;
        report.decrypted = self.decrypt_all(workspace).await?;
        report.extracted = self.unzip_all(workspace).await?;

        let nodes = workspace.list_files().await?;
        let documents = classify_all(&nodes);
        report.classified = documents.len();
        debug!(files = nodes.len(), documents = report.classified, "Classified workspace");

        report.groups = self.grouper.group_by_policy(documents).await;
        for group in &report.groups {
            report.delivered += self.webhook.notify_group(group).await;
        }
        Ok(report)
    }

    async fn download_all(&self, dir: &Path, remote_files: Vec<String>) -> usize {
        let storage = Arc::clone(&self.storage);
        let dir = dir.to_path_buf();
        let remove_after = self.config.remove_after_download;

        let outcome = run_bounded("download", remote_files, self.config.intake_concurrency, move |remote| {
            let storage = Arc::clone(&storage);
            let dir = dir.clone();
            async move {
                let name = Path::new(&remote)
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| remote.clone().into());
                let local = dir.join(name);
                debug!(remote = %remote, local = %local.display(), "Downloading");
                storage.get(&local, &remote).await?;

                if remove_after {
                    if let Err(e) = storage.remove(&remote).await {
                        warn!(remote = %remote, error = %e, "Failed to remove downloaded remote file");
                    }
                }
                Ok::<_, IntakeError>(local)
            }
        })
        .await;
        outcome.completed.len()
    }

    async fn decrypt_all(&self, workspace: &Workspace) -> std::result::Result<usize, IntakeError> {
        let encrypted = files_with_extension(workspace, "pgp").await?;
        if encrypted.is_empty() {
            return Ok(0);
        }

        let key_path = &self.config.private_key_path;
        let key = tokio::fs::read_to_string(key_path)
            .await
            .map_err(|source| IntakeError::PrivateKey {
                path: key_path.clone(),
                source,
            })?;
        let key = Arc::new(SecretString::from(key));
        let encryption = Arc::clone(&self.encryption);

        let outcome = run_bounded("decrypt", encrypted, self.config.intake_concurrency, move |path| {
            let encryption = Arc::clone(&encryption);
            let key = Arc::clone(&key);
            async move { decrypt_file(encryption.as_ref(), &key, path).await }
        })
        .await;
        Ok(outcome.completed.len())
    }

    async fn unzip_all(&self, workspace: &Workspace) -> std::result::Result<usize, IntakeError> {
        let archives = files_with_extension(workspace, "zip").await?;
        let extractor = Arc::clone(&self.archives);

        let outcome = run_bounded("unzip", archives, self.config.intake_concurrency, move |path| {
            let extractor = Arc::clone(&extractor);
            async move {
                let dest = path.with_extension("");
                debug!(archive = %path.display(), dest = %dest.display(), "Unzipping");
                let written = extractor.unzip(&path, &dest).await?;
                tokio::fs::remove_file(&path).await?;
                Ok::<_, IntakeError>(written.len())
            }
        })
        .await;
        Ok(outcome.completed.len())
    }
}

/// Regular files in the workspace whose extension matches `ext`, ignoring case.
async fn files_with_extension(workspace: &Workspace, ext: &str) -> std::result::Result<Vec<PathBuf>, IntakeError> {
    Ok(workspace
        .list_files()
        .await?
        .into_iter()
        .map(|node| node.full_path)
        .filter(|path| {
            path.extension()
                .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        })
        .collect())
}

/// Decrypt `path` to the same name without `.pgp`, then delete `path`.
async fn decrypt_file(
    encryption: &dyn Encryption,
    private_key: &SecretString,
    path: PathBuf,
) -> std::result::Result<PathBuf, IntakeError> {
    let ciphertext = tokio::fs::read(&path).await?;
    let plaintext = encryption.decrypt(ciphertext, private_key).await?;

    let out = path.with_extension("");
    tokio::fs::write(&out, plaintext).await?;
    tokio::fs::remove_file(&path).await?;
    debug!(from = %path.display(), to = %out.display(), "Decrypted");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use crate::error::CryptoError;

    /// Reverses bytes; refuses any key other than "k".
    struct Reverse;

    #[async_trait]
    impl Encryption for Reverse {
        async fn encrypt(&self, mut plaintext: Vec<u8>, _key: &str) -> std::result::Result<Vec<u8>, CryptoError> {
            plaintext.reverse();
            Ok(plaintext)
        }

        async fn decrypt(
            &self,
            mut ciphertext: Vec<u8>,
            key: &SecretString,
        ) -> std::result::Result<Vec<u8>, CryptoError> {
            if key.expose_secret() != "k" {
                return Err(CryptoError::InvalidKey("wrong key".into()));
            }
            ciphertext.reverse();
            Ok(ciphertext)
        }
    }

    #[tokio::test]
    async fn decrypt_strips_suffix_and_removes_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("A1_MO_DOC_20200731.zip.pgp");
        std::fs::write(&src, b"cba").unwrap();

        let out = decrypt_file(&Reverse, &SecretString::from("k".to_string()), src.clone())
            .await
            .unwrap();
        assert_eq!(out, dir.path().join("A1_MO_DOC_20200731.zip"));
        assert_eq!(std::fs::read(&out).unwrap(), b"abc");
        assert!(!src.exists());
    }

    #[tokio::test]
    async fn failed_decrypt_keeps_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("bundle.pgp");
        std::fs::write(&src, b"xyz").unwrap();

        let err = decrypt_file(&Reverse, &SecretString::from("nope".to_string()), src.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Crypto(_)));
        assert!(src.exists());
        assert!(!dir.path().join("bundle").exists());
    }

    #[tokio::test]
    async fn extension_filter_ignores_case() {
        let base = TempDir::new().unwrap();
        let ws = Workspace::create(base.path()).await.unwrap();
        std::fs::write(ws.resolve("a.PGP"), b"").unwrap();
        std::fs::write(ws.resolve("b.pgp"), b"").unwrap();
        std::fs::write(ws.resolve("c.zip"), b"").unwrap();
        std::fs::write(ws.resolve("pgp"), b"").unwrap();

        let found = files_with_extension(&ws, "pgp").await.unwrap();
        assert_eq!(found.len(), 2);
        ws.cleanup().await;
    }
}
