//! Keyed hash bucketing for variant assignment.

use sha2::{Digest, Sha256};

pub(crate) const TRAFFIC: &str = "traffic";
pub(crate) const SPLIT: &str = "split";

/// Maps `(purpose, experiment key, session token)` to a bucket in `0..100`.
///
/// SHA-256 over `"{purpose}|{key}|{token}"`, first 8 bytes big-endian, modulo
/// 100. The experiment key separates experiments and the purpose keeps the
/// traffic gate independent of the A/B split.
pub fn bucket(purpose: &str, experiment_key: &str, session_token: &str) -> u8 {
    let digest = Sha256::digest(format!("{purpose}|{experiment_key}|{session_token}").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u8
}
