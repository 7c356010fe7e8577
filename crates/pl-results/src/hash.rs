//! Content-based hashing for run IDs.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex SHA-256 over the scenario, the extra run inputs and the solver
/// version, each part terminated by a NUL byte.
pub fn compute_run_id<S: Serialize, K: Serialize>(
    scenario: &S,
    inputs: &K,
    solver_version: &str,
) -> String {
    let mut hasher = Sha256::new();
    for part in [to_json(scenario), to_json(inputs), solver_version.to_string()] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
