//! Policy grouping.
//!
//! Classified documents are bucketed by policy number. Every schedule in a
//! bucket is run through OCR and the resulting field maps are merged into
//! one `PolicyGroup`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::intake::classifier::{ClassifiedDocument, DocType};
use crate::intake::period::split_effective_and_expire;
use crate::ocr::{FieldExtractor, FieldMap, PERIOD_OF_INSURANCE};

/// Labels the schedule form uses for each field.
pub mod labels {
    pub const CHASSIS_NO: &str = "Chassis No.";
    pub const ENGINE_NO: &str = "Engine No. or Type";
    pub const REGISTRATION_NO: &str = "Registration No.";
    pub const PREMIUM_PAYABLE: &str = "Premium Payable";
    pub const MAKE: &str = "Make";
    pub const MODEL: &str = "Model";
    pub const TYPE_OF_COVER: &str = "Type of Cover";
    pub const BODY: &str = "Body";
    pub const POLICY_NO: &str = "Policy No.";
    pub const NCB: &str = "NCB";
}

/// All documents of one policy plus the fields read off its schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyGroup {
    pub files: Vec<ClassifiedDocument>,
    pub chassis_number: String,
    pub engine_number: String,
    pub registration_number: String,
    pub premium_payable: String,
    pub make: String,
    pub model: String,
    pub type_of_cover: String,
    pub body_type: String,
    /// Bucket key shared by every file in the group.
    pub policy_number: String,
    pub ncb: String,
    pub effective_date: Option<DateTime<FixedOffset>>,
    pub expire_date: Option<DateTime<FixedOffset>>,
}

impl PolicyGroup {
    fn new(policy_number: String, files: Vec<ClassifiedDocument>) -> Self {
        Self {
            files,
            policy_number,
            ..Default::default()
        }
    }

    fn apply_fields(&mut self, fields: &FieldMap) {
        let get = |label: &str| fields.get(label).cloned().unwrap_or_default();
        self.chassis_number = get(labels::CHASSIS_NO);
        self.engine_number = get(labels::ENGINE_NO);
        self.registration_number = get(labels::REGISTRATION_NO);
        self.premium_payable = get(labels::PREMIUM_PAYABLE);
        self.make = get(labels::MAKE);
        self.model = get(labels::MODEL);
        self.type_of_cover = get(labels::TYPE_OF_COVER);
        self.body_type = get(labels::BODY);
        self.ncb = get(labels::NCB);
    }
}

/// Groups classified documents and enriches each group with OCR fields.
pub struct PolicyGrouper {
    extractor: Arc<dyn FieldExtractor>,
    span: Span,
}

impl PolicyGrouper {
    pub fn new(extractor: Arc<dyn FieldExtractor>) -> Self {
        Self {
            extractor,
            span: info_span!("grouper"),
        }
    }

    /// One group per distinct policy number, ordered by policy number.
    ///
    /// OCR and period failures are logged and leave the affected fields empty.
    pub async fn group_by_policy(&self, docs: Vec<ClassifiedDocument>) -> Vec<PolicyGroup> {
        async move {
            let mut buckets: BTreeMap<String, Vec<ClassifiedDocument>> = BTreeMap::new();
            for doc in docs {
                buckets.entry(doc.policy_number.clone()).or_default().push(doc);
            }

            let mut groups = Vec::with_capacity(buckets.len());
            for (policy_number, files) in buckets {
                let group = self.build_group(policy_number, files).await;
                groups.push(group);
            }
            info!(groups = groups.len(), "Grouped policy documents");
            groups
        }
        .instrument(self.span.clone())
        .await
    }

    async fn build_group(&self, policy_number: String, files: Vec<ClassifiedDocument>) -> PolicyGroup {
        let mut merged = FieldMap::new();
        for doc in files.iter().filter(|d| d.doc_type == DocType::Schedule) {
            let path = &doc.node.full_path;
            match self.extractor.extract_from_file(path).await {
                Ok(fields) => {
                    debug!(policy = %policy_number, path = %path.display(), fields = fields.len(), "Schedule read");
                    merged.extend(fields);
                }
                Err(e) => {
                    warn!(policy = %policy_number, path = %path.display(), error = %e, "OCR failed, skipping schedule");
                }
            }
        }

        let mut group = PolicyGroup::new(policy_number, files);
        if merged.is_empty() {
            return group;
        }
        group.apply_fields(&merged);

        if let Some(period) = merged.get(PERIOD_OF_INSURANCE) {
            match split_effective_and_expire(period) {
                Ok(parsed) => {
                    group.effective_date = Some(parsed.effective);
                    group.expire_date = Some(parsed.expires);
                }
                Err(e) => {
                    warn!(policy = %group.policy_number, error = %e, "Unparseable insurance period");
                }
            }
        }
        group
    }
}
