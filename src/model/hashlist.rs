use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::HashlistId;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Hashlist {
    pub id: HashlistId,
    pub name: String,
    pub hash_type_id: i32,
    pub total_hashes: i64,
    pub cracked_hashes: i64,
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hash {
    pub hashlist_id: HashlistId,
    pub hash_value: String,
    pub username: Option<String>,
    pub is_cracked: bool,
    pub password: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Case-insensitive hash types (NTLM, raw MD5, ...) are normalized by
/// lowercasing hex before the dedup lookup; everything else is identity
/// (§4.8). The hash-type identifiers that are case-insensitive are a fixed
/// hashcat convention; `is_case_insensitive_hash_type` encodes the common
/// ones used by this deployment's supported algorithms.
pub fn normalize_hash_value(hash_type_id: i32, raw: &str) -> String {
    if is_case_insensitive_hash_type(hash_type_id) {
        raw.to_lowercase()
    } else {
        raw.to_string()
    }
}

fn is_case_insensitive_hash_type(hash_type_id: i32) -> bool {
    matches!(hash_type_id, 0 | 1000 | 1100 | 3000 | 5500 | 5600)
}
