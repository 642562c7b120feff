//! Compliance updater workflow.
//!
//! For each requirement in a compliance document, searches the check index
//! with the requirement's description and attaches the identities of checks
//! whose similarity clears the confidence threshold, capped at a configured
//! maximum. Requirements are processed independently; a requirement with no
//! match above the threshold keeps an empty check list, which is not an
//! error. Deterministic for a given index, query, k, and threshold.

use tracing::{debug, info};

use crate::error::Result;
use crate::models::{ComplianceDocument, SearchFilter};
use crate::store::VectorStore;

/// Per-run summary returned to the front-end.
#[derive(Debug, Default)]
pub struct ComplianceUpdateReport {
    pub requirements_processed: usize,
    pub checks_attached: usize,
}

/// Attach related checks to every requirement of `document` in place.
pub async fn update_compliance(
    store: &VectorStore,
    document: &mut ComplianceDocument,
    max_checks_per_requirement: usize,
    confidence_threshold: f32,
) -> Result<ComplianceUpdateReport> {
    store.require_index().await?;

    let filter = if document.provider.is_empty() {
        SearchFilter::default()
    } else {
        SearchFilter::provider(&document.provider.to_lowercase())
    };

    let mut report = ComplianceUpdateReport::default();

    for requirement in &mut document.requirements {
        report.requirements_processed += 1;

        if requirement.description.trim().is_empty() {
            continue;
        }

        let matches = store
            .search(&requirement.description, max_checks_per_requirement, &filter)
            .await?;

        for related in matches {
            if related.score < confidence_threshold {
                // Results are sorted by score; nothing further can qualify.
                break;
            }
            if requirement.checks.len() >= max_checks_per_requirement {
                break;
            }
            if !requirement.checks.contains(&related.id.check_name) {
                debug!(
                    requirement = %requirement.id,
                    check = %related.id,
                    score = related.score,
                    "attaching check"
                );
                requirement.checks.push(related.id.check_name.clone());
                report.checks_attached += 1;
            }
        }
    }

    info!(
        requirements = report.requirements_processed,
        attached = report.checks_attached,
        "compliance update complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::models::{CheckId, CheckRecord, ComplianceRequirement};
    use tempfile::TempDir;

    fn record(provider: &str, service: &str, name: &str, description: &str) -> CheckRecord {
        CheckRecord {
            id: CheckId::new(provider, service, name),
            description: description.to_string(),
            code: "def execute(): pass".to_string(),
            metadata_json: "{}".to_string(),
            severity: "medium".to_string(),
            content_hash: format!("hash-{}", name),
        }
    }

    async fn seeded_store(tmp: &TempDir) -> VectorStore {
        let config = EmbeddingConfig {
            provider: "hash".to_string(),
            ..Default::default()
        };
        let store = VectorStore::connect(&tmp.path().join("index.sqlite"), &config, None)
            .await
            .unwrap();
        store
            .build(
                &[
                    record(
                        "aws",
                        "ebs",
                        "ebs_volume_encryption",
                        "Ensure data is encrypted at rest",
                    ),
                    record(
                        "aws",
                        "ec2",
                        "ec2_instance_public_ip",
                        "Ensure EC2 instances have no public IP addresses",
                    ),
                ],
                &[],
                false,
            )
            .await
            .unwrap();
        store
    }

    fn document(description: &str) -> ComplianceDocument {
        ComplianceDocument {
            provider: "aws".to_string(),
            requirements: vec![ComplianceRequirement {
                id: "1.1".to_string(),
                description: description.to_string(),
                checks: Vec::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_match_above_threshold_is_attached() {
        let tmp = TempDir::new().unwrap();
        let store = seeded_store(&tmp).await;

        // Identical wording: similarity ~1.0, comfortably above threshold.
        let mut doc = document("Ensure data is encrypted at rest");
        let report = update_compliance(&store, &mut doc, 10, 0.6).await.unwrap();

        assert_eq!(doc.requirements[0].checks, vec!["ebs_volume_encryption"]);
        assert_eq!(report.checks_attached, 1);
    }

    #[tokio::test]
    async fn test_below_threshold_leaves_requirement_empty() {
        let tmp = TempDir::new().unwrap();
        let store = seeded_store(&tmp).await;

        let mut doc = document("employees must complete security awareness training");
        update_compliance(&store, &mut doc, 10, 0.6).await.unwrap();

        assert!(doc.requirements[0].checks.is_empty());
    }

    #[tokio::test]
    async fn test_attached_count_never_exceeds_maximum() {
        let tmp = TempDir::new().unwrap();
        let config = EmbeddingConfig {
            provider: "hash".to_string(),
            ..Default::default()
        };
        let store = VectorStore::connect(&tmp.path().join("index.sqlite"), &config, None)
            .await
            .unwrap();
        // Three checks with identical descriptions all score ~1.0.
        store
            .build(
                &[
                    record("aws", "s3", "s3_enc_a", "Ensure data is encrypted at rest"),
                    record("aws", "ebs", "ebs_enc_b", "Ensure data is encrypted at rest"),
                    record("aws", "rds", "rds_enc_c", "Ensure data is encrypted at rest"),
                ],
                &[],
                false,
            )
            .await
            .unwrap();

        let mut doc = document("Ensure data is encrypted at rest");
        update_compliance(&store, &mut doc, 2, 0.6).await.unwrap();

        assert_eq!(doc.requirements[0].checks.len(), 2);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = seeded_store(&tmp).await;

        let mut doc = document("Ensure data is encrypted at rest");
        update_compliance(&store, &mut doc, 10, 0.6).await.unwrap();
        let first = doc.requirements[0].checks.clone();

        let report = update_compliance(&store, &mut doc, 10, 0.6).await.unwrap();
        assert_eq!(doc.requirements[0].checks, first);
        assert_eq!(report.checks_attached, 0);
    }

    #[tokio::test]
    async fn test_provider_filter_scopes_matches() {
        let tmp = TempDir::new().unwrap();
        let store = seeded_store(&tmp).await;

        // Document scoped to a provider with no indexed checks.
        let mut doc = document("Ensure data is encrypted at rest");
        doc.provider = "azure".to_string();
        update_compliance(&store, &mut doc, 10, 0.6).await.unwrap();

        assert!(doc.requirements[0].checks.is_empty());
    }
}
