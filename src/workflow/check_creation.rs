//! Check creation workflow.
//!
//! A linear pipeline: classify the request → retrieve related checks and the
//! service wrapper → generate check metadata and code → optionally generate
//! a fixer → assemble the result. Classification is lexical against the
//! index's known providers and services; an ambiguous request widens the
//! search scope instead of failing. Every LLM failure aborts the run with
//! [`StudioError::GenerationFailed`] carrying the step name.

use tracing::{info, warn};

use crate::config::RetrievalConfig;
use crate::error::{Result, StudioError};
use crate::llm::CompletionModel;
use crate::models::{CheckMetadata, GeneratedCheck, RelatedCheck, SearchFilter};
use crate::prompts;
use crate::store::VectorStore;

/// Step names reported in [`StudioError::GenerationFailed`].
pub mod steps {
    pub const CLASSIFY: &str = "classify";
    pub const RETRIEVE: &str = "retrieve";
    pub const GENERATE_METADATA: &str = "generate_metadata";
    pub const GENERATE_CODE: &str = "generate_code";
    pub const GENERATE_FIXER: &str = "generate_fixer";
}

/// Input to one workflow run.
#[derive(Debug, Clone)]
pub struct CheckCreationRequest {
    pub user_query: String,
    pub with_fixer: bool,
}

/// Outcome of a workflow run.
#[derive(Debug)]
pub enum CheckCreationOutcome {
    /// A new check (and optionally its fixer) was generated.
    Generated(GeneratedCheck),
    /// The request is already covered by existing checks; nothing was
    /// generated. Carries the covering checks for the user to review.
    AlreadyCovered { existing: Vec<RelatedCheck> },
}

/// Provider/service scope resolved from the request.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub provider: Option<String>,
    pub service: Option<String>,
}

impl Classification {
    fn filter(&self) -> SearchFilter {
        SearchFilter {
            provider: self.provider.clone(),
            service: self.service.clone(),
        }
    }
}

/// Run the check creation workflow.
pub async fn run(
    store: &VectorStore,
    model: &dyn CompletionModel,
    retrieval: &RetrievalConfig,
    request: &CheckCreationRequest,
) -> Result<CheckCreationOutcome> {
    let query = request.user_query.trim();
    if query.is_empty() {
        return Err(StudioError::InvalidArgument(
            "user query must not be empty".to_string(),
        ));
    }
    store.require_index().await?;

    // Step 1: classify.
    let classification = classify(store, query).await?;
    info!(
        provider = classification.provider.as_deref().unwrap_or("*"),
        service = classification.service.as_deref().unwrap_or("*"),
        "classified request"
    );

    // Step 2: retrieve related checks as few-shot examples.
    let related = retrieve(store, query, retrieval, &classification).await?;

    if let Some(best) = related.first() {
        if best.score >= retrieval.duplicate_threshold {
            info!(check = %best.id, score = best.score, "request already covered");
            return Ok(CheckCreationOutcome::AlreadyCovered { existing: related });
        }
    }

    let service_code = match (&classification.provider, &classification.service) {
        (Some(provider), Some(service)) => store.service_code(provider, service).await?,
        _ => None,
    };

    let suggested_name = suggest_check_name(query, &classification);

    // Step 3: generate metadata, then code.
    let metadata = generate_metadata(store, model, query, &suggested_name, &classification, &related)
        .await?;
    let code = generate_code(store, model, query, &metadata, &related, service_code.as_deref())
        .await?;

    // Step 4 (optional): generate the fixer.
    let fixer_code = if request.with_fixer {
        Some(generate_fixer(model, &metadata.check_id, &metadata.description, &code).await?)
    } else {
        None
    };

    // Step 5: assemble.
    Ok(CheckCreationOutcome::Generated(GeneratedCheck {
        metadata,
        code,
        fixer_code,
        related_checks: related,
    }))
}

/// Match query tokens against the providers and services known to the
/// index. No match is not an error — the search scope just stays broad.
async fn classify(store: &VectorStore, query: &str) -> Result<Classification> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut classification = Classification::default();

    for provider in store.providers().await? {
        if tokens.iter().any(|t| *t == provider) {
            classification.provider = Some(provider);
            break;
        }
    }

    if let Some(ref provider) = classification.provider {
        for service in store.services_for_provider(provider).await? {
            if tokens.iter().any(|t| *t == service) {
                classification.service = Some(service);
                break;
            }
        }
    }

    Ok(classification)
}

/// Search the index within the classified scope; if the scoped search comes
/// back empty, retry without any filter before giving up.
async fn retrieve(
    store: &VectorStore,
    query: &str,
    retrieval: &RetrievalConfig,
    classification: &Classification,
) -> Result<Vec<RelatedCheck>> {
    let scoped = store
        .search(query, retrieval.num_related_checks, &classification.filter())
        .await?;

    if !scoped.is_empty() {
        return Ok(scoped);
    }

    if classification.provider.is_some() {
        warn!("no related checks in classified scope, widening search");
        return store
            .search(query, retrieval.num_related_checks, &SearchFilter::default())
            .await;
    }

    Ok(scoped)
}

async fn generate_metadata(
    store: &VectorStore,
    model: &dyn CompletionModel,
    query: &str,
    suggested_name: &str,
    classification: &Classification,
    related: &[RelatedCheck],
) -> Result<CheckMetadata> {
    let mut related_metadata = Vec::new();
    for related_check in related {
        if let Some(metadata) = store.check_metadata(&related_check.id).await? {
            related_metadata.push(metadata);
        }
    }

    let prompt = prompts::check_metadata_prompt(
        suggested_name,
        classification.provider.as_deref().unwrap_or("unknown"),
        classification.service.as_deref().unwrap_or("unknown"),
        query,
        &related_metadata,
    );

    let response = model
        .complete(&prompt)
        .await
        .map_err(|e| generation_failed(steps::GENERATE_METADATA, e))?;

    let metadata: CheckMetadata = serde_json::from_str(prompts::strip_code_fence(&response))
        .map_err(|e| StudioError::GenerationFailed {
            step: steps::GENERATE_METADATA,
            message: format!("model output failed schema validation: {}", e),
        })?;

    validate_metadata(&metadata)?;
    Ok(metadata)
}

/// Reject structurally valid JSON that still violates the schema contract.
fn validate_metadata(metadata: &CheckMetadata) -> Result<()> {
    let invalid = |message: String| StudioError::GenerationFailed {
        step: steps::GENERATE_METADATA,
        message,
    };

    if metadata.check_id.is_empty() {
        return Err(invalid("generated metadata has an empty CheckID".to_string()));
    }
    match metadata.severity.as_str() {
        "critical" | "high" | "medium" | "low" => Ok(()),
        other => Err(invalid(format!(
            "generated metadata has invalid Severity '{}'",
            other
        ))),
    }
}

async fn generate_code(
    store: &VectorStore,
    model: &dyn CompletionModel,
    query: &str,
    metadata: &CheckMetadata,
    related: &[RelatedCheck],
    service_code: Option<&str>,
) -> Result<String> {
    let mut examples = Vec::new();
    for related_check in related {
        if let Some(code) = store.check_code(&related_check.id).await? {
            examples.push((related_check.clone(), code));
        }
    }

    let prompt = prompts::check_code_prompt(
        &metadata.check_id,
        &metadata.service_name,
        query,
        &examples,
        service_code,
    );

    let response = model
        .complete(&prompt)
        .await
        .map_err(|e| generation_failed(steps::GENERATE_CODE, e))?;

    let code = prompts::strip_code_fence(&response).to_string();
    if code.is_empty() {
        return Err(StudioError::GenerationFailed {
            step: steps::GENERATE_CODE,
            message: "model returned empty check code".to_string(),
        });
    }
    Ok(code)
}

/// Generate the remediation function for a check. Shared with the fixer
/// creation workflow, which runs it against an already-indexed check.
pub(crate) async fn generate_fixer(
    model: &dyn CompletionModel,
    check_id: &str,
    description: &str,
    check_code: &str,
) -> Result<String> {
    let prompt = prompts::fixer_prompt(check_id, description, check_code);

    let response = model
        .complete(&prompt)
        .await
        .map_err(|e| generation_failed(steps::GENERATE_FIXER, e))?;

    let code = prompts::strip_code_fence(&response).to_string();
    if code.is_empty() {
        return Err(StudioError::GenerationFailed {
            step: steps::GENERATE_FIXER,
            message: "model returned empty fixer code".to_string(),
        });
    }
    Ok(code)
}

/// Deterministic name suggestion handed to the metadata prompt. The model
/// may refine it; the generated CheckID is what gets validated and used.
fn suggest_check_name(query: &str, classification: &Classification) -> String {
    let prefix = classification.service.as_deref().unwrap_or("check");

    let slug: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| {
            Some(t.as_str()) != classification.provider.as_deref()
                && Some(t.as_str()) != classification.service.as_deref()
        })
        .take(4)
        .collect();

    if slug.is_empty() {
        prefix.to_string()
    } else {
        format!("{}_{}", prefix, slug.join("_"))
    }
}

fn generation_failed(step: &'static str, err: anyhow::Error) -> StudioError {
    StudioError::GenerationFailed {
        step,
        message: err.to_string(),
    }
}
