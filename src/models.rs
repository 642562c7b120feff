//! Core data models used throughout Check Studio.
//!
//! These types represent the checks, retrieval results, and compliance
//! documents that flow through the indexing and generation pipeline.

use serde::{Deserialize, Serialize};

/// Identity of a check: (provider, service, check name).
///
/// The derived `Ord` gives the deterministic tie-break ordering used by
/// search results and diff reports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckId {
    pub provider: String,
    pub service: String,
    pub check_name: String,
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.provider, self.service, self.check_name)
    }
}

impl CheckId {
    pub fn new(provider: &str, service: &str, check_name: &str) -> Self {
        Self {
            provider: provider.to_string(),
            service: service.to_string(),
            check_name: check_name.to_string(),
        }
    }
}

/// A check discovered during an inventory scan.
#[derive(Debug, Clone)]
pub struct CheckRecord {
    pub id: CheckId,
    /// Free-text description from the metadata file; this is what gets embedded.
    pub description: String,
    /// Source code of the check.
    pub code: String,
    /// Raw metadata JSON as found on disk.
    pub metadata_json: String,
    pub severity: String,
    /// SHA-256 over metadata + code; identity-stable change detector.
    pub content_hash: String,
}

/// A service SDK-wrapper source file discovered during a scan. Its code is
/// handed to the generation prompt as API reference material.
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    pub provider: String,
    pub service: String,
    pub code: String,
    pub content_hash: String,
}

/// Delta between two inventory snapshots, keyed by [`CheckId`].
#[derive(Debug, Clone, Default)]
pub struct InventoryDiff {
    pub added: Vec<CheckRecord>,
    pub updated: Vec<CheckRecord>,
    pub removed: Vec<CheckId>,
}

impl InventoryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// One match from a vector store search.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedCheck {
    pub id: CheckId,
    pub score: f32,
}

/// Provider/service restriction applied to a search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub provider: Option<String>,
    pub service: Option<String>,
}

impl SearchFilter {
    pub fn provider(provider: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            service: None,
        }
    }

    pub fn provider_service(provider: &str, service: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            service: Some(service.to_string()),
        }
    }
}

/// Remediation code snippets for a generated check, one per format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationCode {
    #[serde(rename = "NativeIaC")]
    pub native_iac: String,
    #[serde(rename = "Terraform")]
    pub terraform: String,
    #[serde(rename = "CLI")]
    pub cli: String,
    #[serde(rename = "Other")]
    pub other: String,
}

/// Remediation recommendation text and reference URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Recommendation {
    #[serde(rename = "Text")]
    pub text: String,
    #[serde(rename = "Url")]
    pub url: String,
}

/// Remediation block of a check's metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Remediation {
    #[serde(rename = "Code")]
    pub code: RemediationCode,
    #[serde(rename = "Recommendation")]
    pub recommendation: Recommendation,
}

/// Structured metadata of a check, as stored in `<check>.metadata.json`
/// files and as required from the model during generation.
///
/// Field names follow the on-disk metadata schema (PascalCase).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckMetadata {
    #[serde(rename = "Provider")]
    pub provider: String,
    #[serde(rename = "CheckID")]
    pub check_id: String,
    #[serde(rename = "CheckTitle", default)]
    pub check_title: String,
    #[serde(rename = "ServiceName")]
    pub service_name: String,
    #[serde(rename = "Severity", default)]
    pub severity: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Risk", default)]
    pub risk: String,
    #[serde(rename = "Remediation", default)]
    pub remediation: Remediation,
    #[serde(rename = "Notes", default)]
    pub notes: String,
}

/// Result of a check creation workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedCheck {
    pub metadata: CheckMetadata,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixer_code: Option<String>,
    /// Existing checks retrieved as few-shot grounding for the generation.
    pub related_checks: Vec<RelatedCheck>,
}

/// One control item in a compliance framework document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRequirement {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Checks", default)]
    pub checks: Vec<String>,
}

/// A compliance framework document mapping requirements to checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceDocument {
    #[serde(rename = "Provider", default)]
    pub provider: String,
    #[serde(rename = "Requirements")]
    pub requirements: Vec<ComplianceRequirement>,
}
