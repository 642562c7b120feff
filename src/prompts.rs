//! Prompt template set for the generation steps.
//!
//! Each workflow step that talks to the model has one renderer here. The
//! templates embed the retrieved example checks and the service wrapper
//! source so the model generates code in the shape of the existing
//! inventory rather than inventing its own conventions.

use crate::models::RelatedCheck;

const SYSTEM_CONTEXT: &str = "You are an expert cloud security engineer working on an \
open-source cloud security posture management tool. A 'check' is an automated audit \
script that evaluates one security control against a cloud resource and reports PASS \
or FAIL per resource. A 'fixer' is a remediation function that corrects a resource \
found failing a check.";

/// Prompt for generating the structured metadata of a new check.
///
/// The model is required to answer with a single JSON object matching the
/// check metadata schema; the response is schema-validated by the caller and
/// never pattern-matched as free text.
pub fn check_metadata_prompt(
    check_name: &str,
    provider: &str,
    service: &str,
    description: &str,
    related_metadata: &[String],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(SYSTEM_CONTEXT);
    prompt.push_str("\n\nTASK: Write the metadata for a new check.\n");
    prompt.push_str(&format!(
        "Check name: {}\nProvider: {}\nService: {}\nWhat the check must verify: {}\n",
        check_name, provider, service, description
    ));

    if !related_metadata.is_empty() {
        prompt.push_str("\nMetadata of related existing checks, as examples of tone and field usage:\n");
        for metadata in related_metadata {
            prompt.push_str("---\n");
            prompt.push_str(metadata);
            prompt.push('\n');
        }
    }

    prompt.push_str(
        "\nRespond with a single JSON object and nothing else. Required fields: \
         Provider, CheckID, CheckTitle, ServiceName, Severity (one of: critical, high, \
         medium, low), Description, Risk, Remediation (with Code {NativeIaC, Terraform, \
         CLI, Other} and Recommendation {Text, Url}), Notes. \
         Do not wrap the JSON in markdown fences.",
    );
    prompt
}

/// Prompt for generating the executable code of a new check.
pub fn check_code_prompt(
    check_name: &str,
    service: &str,
    description: &str,
    related_checks: &[(RelatedCheck, String)],
    service_code: Option<&str>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(SYSTEM_CONTEXT);
    prompt.push_str("\n\nTASK: Write the code for a new check.\n");
    prompt.push_str(&format!(
        "Check name: {}\nService: {}\nWhat the check must verify: {}\n",
        check_name, service, description
    ));

    if let Some(code) = service_code {
        prompt.push_str(
            "\nService client code. The check may only read attributes this client exposes:\n",
        );
        prompt.push_str(code);
        prompt.push('\n');
    }

    if !related_checks.is_empty() {
        prompt.push_str("\nExisting checks to imitate, closest matches first:\n");
        for (related, code) in related_checks {
            prompt.push_str(&format!("--- {} ---\n", related.id));
            prompt.push_str(code);
            prompt.push('\n');
        }
    }

    prompt.push_str(
        "\nRespond with only the source code of the new check, following the structure, \
         naming, and report fields of the examples. No explanations, no markdown fences.",
    );
    prompt
}

/// Prompt for generating the remediation function of a generated check.
pub fn fixer_prompt(check_name: &str, check_description: &str, check_code: &str) -> String {
    format!(
        "{}\n\nTASK: Write the fixer (remediation function) for the check below.\n\
         Check name: {}\nCheck description: {}\n\nCheck code:\n{}\n\n\
         The fixer must be a function named 'fixer' that remediates a single resource \
         found failing this check and returns True on success and False otherwise. \
         Respond with only the fixer source code. No explanations, no markdown fences.",
        SYSTEM_CONTEXT, check_name, check_description, check_code
    )
}

/// Strip a single surrounding markdown code fence, if present.
///
/// Models occasionally fence their output despite instructions. One fence is
/// tolerated; anything beyond that is the caller's schema validation problem.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the optional language tag on the opening fence line.
    match body.split_once('\n') {
        Some((first_line, remainder)) if !first_line.trim().contains(char::is_whitespace) => {
            remainder.trim()
        }
        _ => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckId;

    #[test]
    fn test_strip_code_fence_plain_text() {
        assert_eq!(strip_code_fence("  hello  "), "hello");
    }

    #[test]
    fn test_strip_code_fence_with_language_tag() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(fenced), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_without_language_tag() {
        let fenced = "```\ndef execute(): pass\n```";
        assert_eq!(strip_code_fence(fenced), "def execute(): pass");
    }

    #[test]
    fn test_check_code_prompt_includes_examples_and_service() {
        let related = vec![(
            RelatedCheck {
                id: CheckId::new("aws", "s3", "s3_bucket_versioning"),
                score: 0.8,
            },
            "def execute(): ...".to_string(),
        )];
        let prompt = check_code_prompt(
            "s3_bucket_public_access",
            "s3",
            "block public access",
            &related,
            Some("class S3Service: ..."),
        );
        assert!(prompt.contains("s3_bucket_versioning"));
        assert!(prompt.contains("class S3Service"));
        assert!(prompt.contains("block public access"));
    }

    #[test]
    fn test_metadata_prompt_requires_json() {
        let prompt = check_metadata_prompt("s3_x", "aws", "s3", "desc", &[]);
        assert!(prompt.contains("single JSON object"));
        assert!(prompt.contains("Severity"));
    }
}
