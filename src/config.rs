//! Configuration types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Deployment environment a distribution run uploads into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployEnv {
    Dev,
    Pro,
    Test,
}

impl DeployEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployEnv::Dev => "dev",
            DeployEnv::Pro => "pro",
            DeployEnv::Test => "test",
        }
    }
}

impl fmt::Display for DeployEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(DeployEnv::Dev),
            "pro" => Ok(DeployEnv::Pro),
            "test" => Ok(DeployEnv::Test),
            other => Err(ConfigError::InvalidValue {
                key: "destination_env".to_string(),
                message: format!("unknown environment {other:?}, expected dev, pro or test"),
            }),
        }
    }
}

/// Remote destination folders, one per deploy environment.
#[derive(Debug, Clone)]
pub struct DeployDirs {
    pub dev: String,
    pub pro: String,
    pub test: String,
}

impl DeployDirs {
    /// Remote folder that `env` uploads land in.
    pub fn resolve(&self, env: DeployEnv) -> &str {
        match env {
            DeployEnv::Dev => &self.dev,
            DeployEnv::Pro => &self.pro,
            DeployEnv::Test => &self.test,
        }
    }
}

impl Default for DeployDirs {
    fn default() -> Self {
        Self {
            dev: "upload/dev".to_string(),
            pro: "upload/pro".to_string(),
            test: "upload/test".to_string(),
        }
    }
}

/// Webhook callback settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Upload endpoint; `{doc_type}` is replaced by the document route segment.
    pub upload_template: String,
    /// Shared secret mixed into the request signature.
    pub api_key: SecretString,
    /// Whole-request timeout for one upload.
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            upload_template: String::new(),
            api_key: SecretString::from(String::new()),
            timeout: Duration::from_secs(120),
        }
    }
}

/// OCR engine settings.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Directory holding `<sha256>.json` raw responses.
    pub cache_dir: PathBuf,
    /// Delay between job status polls.
    pub poll_interval: Duration,
    /// Give up polling after this long. `None` polls until a terminal status.
    pub poll_timeout: Option<Duration>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./tmp/ocr-cache"),
            poll_interval: Duration::from_secs(3),
            poll_timeout: None,
        }
    }
}

/// Notify retry policy for distribution runs.
#[derive(Debug, Clone, Copy)]
pub struct NotifyPolicy {
    /// Total GET attempts, including the first.
    pub max_attempts: u32,
    /// Delay before each retry.
    pub retry_delay: Duration,
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent directory for per-run workspaces.
    pub temp_dir: PathBuf,
    /// Remote drop folder the intake run lists and downloads.
    pub download_dir: String,
    /// Remove remote files after a successful download.
    pub remove_after_download: bool,
    /// Armored PGP private key used to decrypt intake bundles.
    pub private_key_path: PathBuf,
    /// Max in-flight tasks for each intake stage.
    pub intake_concurrency: usize,
    pub deploy_dirs: DeployDirs,
    pub webhook: WebhookConfig,
    pub ocr: OcrConfig,
    pub notify: NotifyPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./tmp"),
            download_dir: "download".to_string(),
            remove_after_download: false,
            private_key_path: PathBuf::from("./keys/private.asc"),
            intake_concurrency: 5,
            deploy_dirs: DeployDirs::default(),
            webhook: WebhookConfig::default(),
            ocr: OcrConfig::default(),
            notify: NotifyPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Build configuration from `POLICY_INTAKE_*` environment variables.
    ///
    /// Unset variables keep their defaults; `POLICY_INTAKE_WEBHOOK_UPLOAD`
    /// is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let upload_template = env("WEBHOOK_UPLOAD").ok_or_else(|| ConfigError::MissingRequired {
            key: "POLICY_INTAKE_WEBHOOK_UPLOAD".to_string(),
            hint: "Set it to the callback URL, e.g. https://host/api/{doc_type}/upload".to_string(),
        })?;

        let intake_concurrency = parse_env("INTAKE_CONCURRENCY")
            .unwrap_or(defaults.intake_concurrency);
        if intake_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "POLICY_INTAKE_INTAKE_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let temp_dir = env("TEMP_DIR").map(PathBuf::from).unwrap_or(defaults.temp_dir);
        let cache_dir = env("OCR_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| temp_dir.join("ocr-cache"));

        Ok(Self {
            download_dir: env("DOWNLOAD_DIR").unwrap_or(defaults.download_dir),
            remove_after_download: parse_env("REMOVE_AFTER_DOWNLOAD")
                .unwrap_or(defaults.remove_after_download),
            private_key_path: env("PGP_PRIVATE_KEY")
                .map(PathBuf::from)
                .unwrap_or(defaults.private_key_path),
            intake_concurrency,
            deploy_dirs: DeployDirs {
                dev: env("DEPLOY_DIR_DEV").unwrap_or(defaults.deploy_dirs.dev),
                pro: env("DEPLOY_DIR_PRO").unwrap_or(defaults.deploy_dirs.pro),
                test: env("DEPLOY_DIR_TEST").unwrap_or(defaults.deploy_dirs.test),
            },
            webhook: WebhookConfig {
                upload_template,
                api_key: SecretString::from(env("WEBHOOK_API_KEY").unwrap_or_default()),
                timeout: parse_env("WEBHOOK_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.webhook.timeout),
            },
            ocr: OcrConfig {
                cache_dir,
                poll_interval: parse_env("OCR_POLL_INTERVAL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.ocr.poll_interval),
                poll_timeout: parse_env("OCR_POLL_TIMEOUT_SECS").map(Duration::from_secs),
            },
            notify: NotifyPolicy {
                max_attempts: parse_env("NOTIFY_ATTEMPTS").unwrap_or(defaults.notify.max_attempts),
                retry_delay: parse_env("NOTIFY_RETRY_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.notify.retry_delay),
            },
            temp_dir,
        })
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(format!("POLICY_INTAKE_{name}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env(name).and_then(|s| s.trim().parse().ok())
}
