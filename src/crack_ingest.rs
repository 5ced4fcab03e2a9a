//! C8 — Crack Ingest.
//!
//! Dedups cracked hashes by `(hashlist_id, normalized(hash_value))` and
//! increments the hashlist's cracked counter only for genuinely new cracks
//! (§4.8). The store's insert is expected to run in the same transaction as
//! the progress update that reported the cracks; this module only decides
//! *what* to write, not the transactional mechanics.

use chrono::Utc;

use crate::model::hashlist::normalize_hash_value;
use crate::model::{Hash, Hashlist, HashlistId};

#[derive(Debug, Clone)]
pub struct CrackedHashReport {
    pub hash_value: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Abstracts the dedup lookup so this module stays testable without a
/// database. Production code backs this with a store query against the
/// `(hashlist_id, hash_value)` unique index.
pub trait CrackLedger {
    fn is_already_cracked(&self, hashlist_id: HashlistId, normalized_hash_value: &str) -> bool;
}

/// Filters `reports` down to genuinely new cracks for `hashlist`, applying
/// dedup normalization per the hashlist's hash type, and returns the `Hash`
/// rows to persist plus how many of them are new (first-cracker wins;
/// duplicates within the same batch are also collapsed).
pub fn ingest(
    hashlist: &Hashlist,
    reports: &[CrackedHashReport],
    ledger: &dyn CrackLedger,
) -> Vec<Hash> {
    let mut seen_in_batch = std::collections::HashSet::new();
    let mut rows = Vec::new();

    for report in reports {
        let normalized = normalize_hash_value(hashlist.hash_type_id, &report.hash_value);
        if ledger.is_already_cracked(hashlist.id, &normalized) {
            continue;
        }
        if !seen_in_batch.insert(normalized.clone()) {
            continue;
        }
        rows.push(Hash {
            hashlist_id: hashlist.id,
            hash_value: report.hash_value.clone(),
            username: report.username.clone(),
            is_cracked: true,
            password: report.password.clone(),
            updated_at: Utc::now(),
        });
    }

    rows
}

/// `hashlist.cracked_hashes` increment for a batch — purely
/// `new_crack_rows.len()` as i64, kept as a named function so the call
/// site at the store boundary reads as intent rather than arithmetic.
pub fn cracked_count_increment(new_crack_rows: &[Hash]) -> i64 {
    new_crack_rows.len() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct FakeLedger {
        already_cracked: std::collections::HashSet<String>,
    }

    impl CrackLedger for FakeLedger {
        fn is_already_cracked(&self, _hashlist_id: HashlistId, normalized_hash_value: &str) -> bool {
            self.already_cracked.contains(normalized_hash_value)
        }
    }

    fn hashlist(hash_type_id: i32) -> Hashlist {
        Hashlist {
            id: Uuid::new_v4(),
            name: "hl".into(),
            hash_type_id,
            total_hashes: 10,
            cracked_hashes: 0,
            file_path: "/tmp/hl".into(),
        }
    }

    #[test]
    fn new_crack_is_ingested() {
        let hl = hashlist(1000); // NTLM, case-insensitive
        let ledger = FakeLedger {
            already_cracked: Default::default(),
        };
        let reports = vec![CrackedHashReport {
            hash_value: "AABBCC".into(),
            username: Some("bob".into()),
            password: Some("hunter2".into()),
        }];
        let rows = ingest(&hl, &reports, &ledger);
        assert_eq!(rows.len(), 1);
        assert_eq!(cracked_count_increment(&rows), 1);
    }

    #[test]
    fn duplicate_against_ledger_is_dropped_case_insensitively() {
        let hl = hashlist(1000);
        let mut already = std::collections::HashSet::new();
        already.insert("aabbcc".to_string());
        let ledger = FakeLedger { already_cracked: already };
        let reports = vec![CrackedHashReport {
            hash_value: "AABBCC".into(),
            username: None,
            password: Some("hunter2".into()),
        }];
        assert!(ingest(&hl, &reports, &ledger).is_empty());
    }

    #[test]
    fn duplicate_within_same_batch_collapses_to_first() {
        let hl = hashlist(1000);
        let ledger = FakeLedger {
            already_cracked: Default::default(),
        };
        let reports = vec![
            CrackedHashReport {
                hash_value: "AABBCC".into(),
                username: None,
                password: Some("first".into()),
            },
            CrackedHashReport {
                hash_value: "aabbcc".into(),
                username: None,
                password: Some("second".into()),
            },
        ];
        let rows = ingest(&hl, &reports, &ledger);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].password.as_deref(), Some("first"));
    }

    #[test]
    fn case_sensitive_hash_type_does_not_normalize() {
        let hl = hashlist(1800); // sha512crypt, case-sensitive
        let mut already = std::collections::HashSet::new();
        already.insert("AABBCC".to_string());
        let ledger = FakeLedger { already_cracked: already };
        let reports = vec![CrackedHashReport {
            hash_value: "aabbcc".into(),
            username: None,
            password: Some("x".into()),
        }];
        // different case, case-sensitive type -> not deduped against the ledger entry
        assert_eq!(ingest(&hl, &reports, &ledger).len(), 1);
    }
}
