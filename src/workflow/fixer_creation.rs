//! Fixer creation workflow.
//!
//! Generates a remediation function for a check that already exists in the
//! index, without touching the check itself. The indexed code and
//! description ground the prompt, so the fixer targets the exact resource
//! attributes the check evaluates.

use tracing::info;

use crate::error::{Result, StudioError};
use crate::llm::CompletionModel;
use crate::models::CheckRecord;
use crate::store::VectorStore;
use crate::workflow::check_creation;

/// Result of a fixer creation run: the fixer source plus the check it was
/// generated for.
#[derive(Debug)]
pub struct GeneratedFixer {
    pub check: CheckRecord,
    pub fixer_code: String,
}

/// Run the fixer creation workflow for the named check.
pub async fn run(
    store: &VectorStore,
    model: &dyn CompletionModel,
    check_name: &str,
) -> Result<GeneratedFixer> {
    let check_name = check_name.trim();
    if check_name.is_empty() {
        return Err(StudioError::InvalidArgument(
            "check name must not be empty".to_string(),
        ));
    }
    store.require_index().await?;

    let check = store.find_check(check_name).await?.ok_or_else(|| {
        StudioError::InvalidArgument(format!("no indexed check named '{}'", check_name))
    })?;
    info!(check = %check.id, "generating fixer for existing check");

    let fixer_code = check_creation::generate_fixer(
        model,
        &check.id.check_name,
        &check.description,
        &check.code,
    )
    .await?;

    Ok(GeneratedFixer { check, fixer_code })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::models::CheckId;
    use crate::workflow::check_creation::steps;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct OneShotModel(&'static str);

    #[async_trait]
    impl CompletionModel for OneShotModel {
        fn reference(&self) -> &str {
            "one-shot"
        }

        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl CompletionModel for FailingModel {
        fn reference(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("LLM API error 503: overloaded")
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
                &[CheckRecord {
                    id: CheckId::new("aws", "s3", "s3_bucket_versioning"),
                    description: "Ensure S3 buckets have versioning enabled".to_string(),
                    code: "def execute(): return findings".to_string(),
                    metadata_json: "{}".to_string(),
                    severity: "medium".to_string(),
                    content_hash: "hash-1".to_string(),
                }],
                &[],
                false,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_generates_fixer_for_indexed_check() {
        let tmp = TempDir::new().unwrap();
        let store = seeded_store(&tmp).await;
        let model = OneShotModel("def fixer(resource):\n    return True");

        let generated = run(&store, &model, "s3_bucket_versioning").await.unwrap();
        assert_eq!(generated.check.id.check_name, "s3_bucket_versioning");
        assert!(generated.fixer_code.contains("def fixer"));
    }

    #[tokio::test]
    async fn test_unknown_check_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = seeded_store(&tmp).await;

        let err = run(&store, &FailingModel, "no_such_check").await.unwrap_err();
        match err {
            StudioError::InvalidArgument(message) => {
                assert!(message.contains("no_such_check"), "got: {}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_llm_failure_carries_step_name() {
        let tmp = TempDir::new().unwrap();
        let store = seeded_store(&tmp).await;

        let err = run(&store, &FailingModel, "s3_bucket_versioning")
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some(steps::GENERATE_FIXER));
    }

    #[tokio::test]
    async fn test_empty_check_name_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = seeded_store(&tmp).await;

        let err = run(&store, &FailingModel, "   ").await.unwrap_err();
        assert!(matches!(err, StudioError::InvalidArgument(_)));
    }
}
