//! Webhook callback client.
//!
//! Every document of a grouped policy is POSTed as multipart form data to the
//! upload endpoint for its document kind, along with the policy fields and a
//! `time`/`signature` pair the receiver uses to authenticate the call.

use std::path::Path;

use chrono::Utc;
use md5::{Digest, Md5};
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::config::WebhookConfig;
use crate::error::WebhookError;
use crate::intake::classifier::DocType;
use crate::intake::grouper::PolicyGroup;

/// Placeholder in the upload template replaced by the route segment.
pub const DOC_TYPE_PLACEHOLDER: &str = "{doc_type}";

const EFFECTIVE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Form field names the receiver expects.
pub mod fields {
    pub const FILE: &str = "file";
    pub const TIME: &str = "time";
    pub const SIGNATURE: &str = "signature";
    pub const CHASSIS_NO: &str = "data[chasis_no]";
    pub const ENGINE_NO: &str = "data[engn_no]";
    pub const REGISTRATION_NO: &str = "data[rgtn_no]";
    pub const MODEL: &str = "data[rgtn_mdl]";
    pub const BODY_TYPE: &str = "data[typ_of_bdy]";
    pub const EFFECTIVE_DATE: &str = "data[pcy_cmnt_dt]";
    pub const POLICY_NO: &str = "data[pcy_no]";
}

/// Hex MD5 of `time` followed by the shared secret.
pub fn sign(time: &str, secret: &SecretString) -> String {
    let mut hasher = Md5::new();
    hasher.update(time.as_bytes());
    hasher.update(secret.expose_secret().as_bytes());
    hex::encode(hasher.finalize())
}

/// Upload URL for one document kind.
pub fn upload_url(template: &str, doc_type: DocType) -> String {
    template.replace(DOC_TYPE_PLACEHOLDER, doc_type.webhook_segment())
}

/// Policy data fields sent alongside every file of `group`.
pub fn policy_fields(group: &PolicyGroup) -> Vec<(&'static str, String)> {
    let effective = group
        .effective_date
        .map(|d| d.format(EFFECTIVE_DATE_FORMAT).to_string())
        .unwrap_or_default();
    vec![
        (fields::CHASSIS_NO, group.chassis_number.clone()),
        (fields::ENGINE_NO, group.engine_number.clone()),
        (fields::REGISTRATION_NO, group.registration_number.clone()),
        (fields::MODEL, group.model.clone()),
        (fields::BODY_TYPE, group.body_type.clone()),
        (fields::EFFECTIVE_DATE, effective),
        (fields::POLICY_NO, group.policy_number.clone()),
    ]
}

/// Signed multipart uploader.
pub struct WebhookClient {
    client: reqwest::Client,
    upload_template: String,
    api_key: SecretString,
    span: Span,
}

impl WebhookClient {
    pub fn new(config: &WebhookConfig) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            upload_template: config.upload_template.clone(),
            api_key: config.api_key.clone(),
            span: info_span!("webhook"),
        })
    }

    /// POST one file with `fields`. Any non-2xx status is an error.
    pub async fn upload_document(
        &self,
        url: &str,
        fields: &[(&'static str, String)],
        path: &Path,
    ) -> Result<(), WebhookError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let bytes = tokio::fs::read(path).await?;

        let time = Utc::now().timestamp().to_string();
        let signature = sign(&time, &self.api_key);

        let mut form = Form::new()
            .part(fields::FILE, Part::bytes(bytes).file_name(file_name.clone()))
            .text(fields::TIME, time)
            .text(fields::SIGNATURE, signature);
        for (name, value) in fields {
            form = form.text(*name, value.clone());
        }

        let resp = self.client.post(url).multipart(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(WebhookError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        match resp.text().await {
            Ok(body) => debug!(url = %url, file = %file_name, response = %body, "Webhook accepted upload"),
            Err(e) => warn!(url = %url, file = %file_name, error = %e, "Webhook accepted upload, response body unreadable"),
        }
        Ok(())
    }

    /// Upload every file of `group`. Returns how many uploads succeeded.
    ///
    /// A failed upload is logged and the remaining files still go out.
    pub async fn notify_group(&self, group: &PolicyGroup) -> usize {
        let data = policy_fields(group);
        async {
            let mut delivered = 0;
            for doc in &group.files {
                let url = upload_url(&self.upload_template, doc.doc_type);
                let path = &doc.node.full_path;
                match self.upload_document(&url, &data, path).await {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        error!(url = %url, path = %path.display(), error = %e, "Webhook upload failed");
                    }
                }
            }
            info!(delivered, total = group.files.len(), "Policy callback finished");
            delivered
        }
        .instrument(info_span!(parent: &self.span, "notify", policy = %group.policy_number))
        .await
    }
}
