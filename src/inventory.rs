//! Check inventory: scanning a check source tree and diffing snapshots.
//!
//! The expected tree layout is one directory per provider and service, with
//! each check as a metadata/code file pair:
//!
//! ```text
//! <root>/providers/<provider>/services/<service>/<service>_service.py
//! <root>/providers/<provider>/services/<service>/<check>/<check>.metadata.json
//! <root>/providers/<provider>/services/<service>/<check>/<check>.py
//! ```
//!
//! Scanning is read-only and partial-failure tolerant: a check with missing
//! or unreadable metadata is skipped and reported in
//! [`ScanOutcome::malformed`]; the rest of the tree is still indexed.

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, StudioError};
use crate::models::{CheckId, CheckRecord, InventoryDiff, ServiceRecord};

/// Metadata fields a check must carry to be indexable.
const REQUIRED_METADATA_FIELDS: &[&str] = &["Provider", "CheckID", "ServiceName", "Description"];

/// Result of walking a check source tree.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub checks: Vec<CheckRecord>,
    pub services: Vec<ServiceRecord>,
    /// Malformed checks encountered during the scan, aggregated for reporting.
    pub malformed: Vec<StudioError>,
}

/// Walk the check source tree under `root` and collect every check and
/// service wrapper. Output is sorted by identity for determinism.
pub fn scan(root: &Path) -> Result<ScanOutcome> {
    let providers_dir = root.join("providers");
    if !providers_dir.is_dir() {
        return Err(StudioError::InvalidArgument(format!(
            "no providers directory under {}",
            root.display()
        )));
    }

    let exclude = default_excludes()?;
    let mut outcome = ScanOutcome::default();

    for entry in WalkDir::new(&providers_dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable tree entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&providers_dir).unwrap_or(path);
        if exclude.is_match(relative.to_string_lossy().as_ref()) {
            continue;
        }

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };

        if let Some(service) = file_name.strip_suffix("_service.py") {
            match read_service_record(path, service) {
                Ok(record) => outcome.services.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping service file"),
            }
        } else if file_name.ends_with(".metadata.json") {
            match read_check_record(path) {
                Ok(record) => {
                    debug!(check = %record.id, "scanned check");
                    outcome.checks.push(record);
                }
                Err(e @ StudioError::MalformedCheck { .. }) => outcome.malformed.push(e),
                Err(e) => return Err(e),
            }
        }
    }

    outcome.checks.sort_by(|a, b| a.id.cmp(&b.id));
    outcome
        .services
        .sort_by(|a, b| (&a.provider, &a.service).cmp(&(&b.provider, &b.service)));

    Ok(outcome)
}

/// Compare two snapshots keyed by [`CheckId`]. A record counts as updated
/// iff its identity matches but its content hash differs.
pub fn diff(previous: &[CheckRecord], current: &[CheckRecord]) -> InventoryDiff {
    let prev_map: BTreeMap<&CheckId, &CheckRecord> =
        previous.iter().map(|r| (&r.id, r)).collect();
    let cur_map: BTreeMap<&CheckId, &CheckRecord> = current.iter().map(|r| (&r.id, r)).collect();

    let mut delta = InventoryDiff::default();

    for (id, record) in &cur_map {
        match prev_map.get(id) {
            None => delta.added.push((*record).clone()),
            Some(prev) if prev.content_hash != record.content_hash => {
                delta.updated.push((*record).clone())
            }
            Some(_) => {}
        }
    }

    for id in prev_map.keys() {
        if !cur_map.contains_key(*id) {
            delta.removed.push((*id).clone());
        }
    }

    delta
}

fn read_check_record(metadata_path: &Path) -> Result<CheckRecord> {
    let malformed = |reason: String| StudioError::MalformedCheck {
        path: metadata_path.to_path_buf(),
        reason,
    };

    let metadata_json = std::fs::read_to_string(metadata_path)
        .map_err(|e| malformed(format!("unreadable metadata file: {}", e)))?;

    let metadata: serde_json::Value = serde_json::from_str(&metadata_json)
        .map_err(|e| malformed(format!("invalid metadata JSON: {}", e)))?;

    let missing: Vec<&str> = REQUIRED_METADATA_FIELDS
        .iter()
        .filter(|field| {
            metadata
                .get(**field)
                .and_then(|v| v.as_str())
                .map(str::is_empty)
                .unwrap_or(true)
        })
        .copied()
        .collect();

    if !missing.is_empty() {
        return Err(malformed(format!(
            "missing required metadata fields: {}",
            missing.join(", ")
        )));
    }

    let field = |name: &str| metadata[name].as_str().unwrap_or_default().to_string();

    let check_name = field("CheckID");
    let code_path = metadata_path.with_file_name(format!("{}.py", check_name));
    let code = std::fs::read_to_string(&code_path)
        .map_err(|e| malformed(format!("unreadable code file {}: {}", code_path.display(), e)))?;

    let id = CheckId {
        provider: field("Provider").to_lowercase(),
        service: field("ServiceName").to_lowercase(),
        check_name,
    };

    Ok(CheckRecord {
        id,
        description: field("Description"),
        severity: field("Severity"),
        content_hash: content_hash(&[&metadata_json, &code]),
        code,
        metadata_json,
    })
}

fn read_service_record(path: &Path, service: &str) -> Result<ServiceRecord> {
    // providers/<provider>/services/<service>/<service>_service.py
    let provider = path
        .ancestors()
        .nth(3)
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            StudioError::InvalidArgument(format!(
                "service file outside provider layout: {}",
                path.display()
            ))
        })?
        .to_string();

    let code = std::fs::read_to_string(path)?;

    Ok(ServiceRecord {
        provider,
        service: service.to_string(),
        content_hash: content_hash(&[&code]),
        code,
    })
}

fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn default_excludes() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in ["**/__pycache__/**", "**/.git/**", "**/*_test.py"] {
        builder
            .add(Glob::new(pattern).map_err(|e| StudioError::InvalidArgument(e.to_string()))?);
    }
    builder
        .build()
        .map_err(|e| StudioError::InvalidArgument(e.to_string()))
}
