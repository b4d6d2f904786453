//! Filename-based document classifier.
//!
//! Policy bundles unpack into `<agent>_MO_DOC_<yyyymmdd>/` folders holding
//! `<policy>_<DOCTYPE>_<yyyymmdd>.pdf` files. Anything else is not a policy
//! document and is skipped without error.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::intake::period::hong_kong;
use crate::storage::RemoteNode;

static POLICY_PATH: LazyLock<Regex> = LazyLock::new(|| {
    let folder = r"([^_\\/]+)_MO_DOC_([0-9]{8})/";
    let file = r"([^_/]+)_(POLICY_SCHEDULE|DEBIT_NOTE_FOR_AGENT|MOTOR_CERTIFICATE_OF_INSURANCE|DUPLICATE_POLICY_SCHEDULE|PAYMENT_CERTIFICATE)_([0-9]{8})\.pdf$";
    Regex::new(&format!("(?i){folder}{file}")).expect("policy path pattern is valid")
});

/// Kind of policy document, from the file name token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocType {
    Schedule,
    DebitNote,
    CertificateOfInsurance,
    DuplicateSchedule,
    PaymentCertificate,
}

impl DocType {
    /// Token as it appears in file names.
    pub fn token(&self) -> &'static str {
        match self {
            DocType::Schedule => "POLICY_SCHEDULE",
            DocType::DebitNote => "DEBIT_NOTE_FOR_AGENT",
            DocType::CertificateOfInsurance => "MOTOR_CERTIFICATE_OF_INSURANCE",
            DocType::DuplicateSchedule => "DUPLICATE_POLICY_SCHEDULE",
            DocType::PaymentCertificate => "PAYMENT_CERTIFICATE",
        }
    }

    /// Route segment the webhook expects for this document kind.
    pub fn webhook_segment(&self) -> &'static str {
        match self {
            DocType::Schedule | DocType::DuplicateSchedule => "schedule",
            DocType::DebitNote => "dc",
            DocType::CertificateOfInsurance => "ci",
            DocType::PaymentCertificate => "ic",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "POLICY_SCHEDULE" => Ok(DocType::Schedule),
            "DEBIT_NOTE_FOR_AGENT" => Ok(DocType::DebitNote),
            "MOTOR_CERTIFICATE_OF_INSURANCE" => Ok(DocType::CertificateOfInsurance),
            "DUPLICATE_POLICY_SCHEDULE" => Ok(DocType::DuplicateSchedule),
            "PAYMENT_CERTIFICATE" => Ok(DocType::PaymentCertificate),
            other => Err(format!("unknown document type {other:?}")),
        }
    }
}

/// A file whose path matched the policy naming convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedDocument {
    pub node: RemoteNode,
    pub agent_number: String,
    pub policy_number: String,
    /// `YYYYMMDD` from the file name.
    pub creation_date: String,
    pub doc_type: DocType,
}

impl ClassifiedDocument {
    /// Creation date as midnight Hong Kong time.
    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        let date = NaiveDate::parse_from_str(&self.creation_date, "%Y%m%d").ok()?;
        hong_kong()
            .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .single()
    }
}

/// Classify one listed file, or `None` if its path does not match.
pub fn classify(node: &RemoteNode) -> Option<ClassifiedDocument> {
    let path = node.normalized_path();
    let Some(caps) = POLICY_PATH.captures(&path) else {
        trace!(path = %path, "Not a policy document");
        return None;
    };

    let doc_type = caps[4].parse().ok()?;
    Some(ClassifiedDocument {
        node: node.clone(),
        agent_number: caps[1].to_string(),
        policy_number: caps[3].to_string(),
        creation_date: caps[5].to_string(),
        doc_type,
    })
}

/// Classify every node, dropping the ones that do not match.
pub fn classify_all(nodes: &[RemoteNode]) -> Vec<ClassifiedDocument> {
    nodes.iter().filter_map(classify).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NodeMetadata;
    use chrono::{Datelike, Timelike};
    use std::path::PathBuf;

    fn node(path: &str) -> RemoteNode {
        RemoteNode {
            full_path: PathBuf::from(path),
            is_directory: false,
            metadata: NodeMetadata::default(),
        }
    }

    #[test]
    fn classifies_every_known_type() {
        let cases = [
            ("POLICY_SCHEDULE", DocType::Schedule),
            ("DEBIT_NOTE_FOR_AGENT", DocType::DebitNote),
            ("MOTOR_CERTIFICATE_OF_INSURANCE", DocType::CertificateOfInsurance),
            ("DUPLICATE_POLICY_SCHEDULE", DocType::DuplicateSchedule),
            ("PAYMENT_CERTIFICATE", DocType::PaymentCertificate),
        ];
        for (token, expected) in cases {
            let path = format!("/tmp/run/bundle/AG057892_MO_DOC_20200731/BMC238973_{token}_20200801.pdf");
            let doc = classify(&node(&path)).unwrap_or_else(|| panic!("{token} should match"));
            assert_eq!(doc.agent_number, "AG057892");
            assert_eq!(doc.policy_number, "BMC238973");
            assert_eq!(doc.creation_date, "20200801");
            assert_eq!(doc.doc_type, expected);
        }
    }

    #[test]
    fn backslash_paths_are_normalized() {
        let doc = classify(&node(
            r"AG057892_MO_DOC_20200731\BMC238973_DEBIT_NOTE_FOR_AGENT_20200731.pdf",
        ))
        .unwrap();
        assert_eq!(doc.doc_type, DocType::DebitNote);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let doc = classify(&node(
            "ag057892_mo_doc_20200731/BMC238973_PAYMENT_CERTIFICATE_20200731.PDF",
        ))
        .unwrap();
        assert_eq!(doc.agent_number, "ag057892");
        assert_eq!(doc.doc_type, DocType::PaymentCertificate);
    }

    #[test]
    fn rejects_non_matching_paths() {
        for path in [
            "asdasd/BMC238973asdasdasdasd20200731.png",
            "AG057892_MO_DOC_20200731/BMC238973_POLICY_SCHEDULE_20200731.png",
            "AG057892_MO_DOC_20200731/BMC238973_RENEWAL_NOTICE_20200731.pdf",
            "AG057892_MO_DOC_20200731/BMC238973_POLICY_SCHEDULE_20200731.pdf.json",
            "AG057892_DOC_20200731/BMC238973_POLICY_SCHEDULE_20200731.pdf",
            "AG057892_MO_DOC_2020073/BMC238973_POLICY_SCHEDULE_20200731.pdf",
            "BMC238973_POLICY_SCHEDULE_20200731.pdf",
        ] {
            assert!(classify(&node(path)).is_none(), "{path} should not match");
        }
    }

    #[test]
    fn file_must_sit_directly_in_agent_folder() {
        assert!(
            classify(&node(
                "AG057892_MO_DOC_20200731/extra/BMC238973_POLICY_SCHEDULE_20200731.pdf"
            ))
            .is_none()
        );
    }

    #[test]
    fn classify_all_filters() {
        let nodes = vec![
            node("AG1_MO_DOC_20200731/P1_POLICY_SCHEDULE_20200731.pdf"),
            node("random.txt"),
            node("AG1_MO_DOC_20200731/P1_DEBIT_NOTE_FOR_AGENT_20200731.pdf"),
        ];
        assert_eq!(classify_all(&nodes).len(), 2);
    }

    #[test]
    fn created_at_is_hong_kong_midnight() {
        let doc = classify(&node("AG1_MO_DOC_20200731/P1_POLICY_SCHEDULE_20200731.pdf")).unwrap();
        let created = doc.created_at().unwrap();
        assert_eq!((created.year(), created.month(), created.day()), (2020, 7, 31));
        assert_eq!(created.hour(), 0);
        assert_eq!(created.offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn webhook_segments() {
        assert_eq!(DocType::Schedule.webhook_segment(), "schedule");
        assert_eq!(DocType::DuplicateSchedule.webhook_segment(), "schedule");
        assert_eq!(DocType::DebitNote.webhook_segment(), "dc");
        assert_eq!(DocType::CertificateOfInsurance.webhook_segment(), "ci");
        assert_eq!(DocType::PaymentCertificate.webhook_segment(), "ic");
    }
}
