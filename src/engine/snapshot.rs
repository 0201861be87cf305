use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::model::{QuerySet, Run, SystemConfig};

/// sha256 over the canonical JSON of both snapshots, in a fixed order.
pub fn snapshot_checksum(
    system_config: &SystemConfig,
    query_set: &QuerySet,
) -> Result<String, EngineError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(system_config)?);
    hasher.update(b"\n");
    hasher.update(serde_json::to_vec(query_set)?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Recomputes the checksum of a stored run and reports whether its snapshots are untouched.
pub fn verify_run_snapshot(run: &Run) -> Result<bool, EngineError> {
    let expected = snapshot_checksum(&run.system_config_snapshot, &run.query_set_snapshot)?;
    Ok(expected == run.snapshot_checksum)
}
