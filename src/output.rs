//! Writes generated checks to disk in the inventory tree layout.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, StudioError};
use crate::models::GeneratedCheck;

/// Write a generated check under `output_dir`.
///
/// Produces `<output_dir>/<check_id>/<check_id>.metadata.json` and
/// `<check_id>.py`, plus `<check_id>_fixer.py` when a fixer was generated.
/// Returns the check's directory. Refuses to overwrite an existing check
/// directory so a rerun cannot silently clobber reviewed output.
pub fn write_check(output_dir: &Path, check: &GeneratedCheck) -> Result<PathBuf> {
    let check_id = &check.metadata.check_id;
    if check_id.is_empty() || check_id.contains(['/', '\\', '.']) {
        return Err(StudioError::InvalidArgument(format!(
            "'{}' is not a usable check identifier",
            check_id
        )));
    }

    let check_dir = output_dir.join(check_id);
    if check_dir.exists() {
        return Err(StudioError::InvalidArgument(format!(
            "output directory already contains '{}'",
            check_dir.display()
        )));
    }
    std::fs::create_dir_all(&check_dir)?;

    let metadata_json = serde_json::to_string_pretty(&check.metadata)
        .map_err(|e| StudioError::InvalidArgument(format!("cannot serialize metadata: {}", e)))?;
    std::fs::write(
        check_dir.join(format!("{}.metadata.json", check_id)),
        metadata_json,
    )?;
    std::fs::write(check_dir.join(format!("{}.py", check_id)), &check.code)?;

    if let Some(fixer) = &check.fixer_code {
        std::fs::write(check_dir.join(format!("{}_fixer.py", check_id)), fixer)?;
    }

    info!(check = %check_id, dir = %check_dir.display(), "wrote generated check");
    Ok(check_dir)
}
