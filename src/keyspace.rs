//! C1 — Keyspace Planner.
//!
//! Converts a user-submitted attack configuration into `base_keyspace` and
//! `multiplication_factor`, from which the job's initial `effective_keyspace`
//! is derived. See spec §4.1; the "authoritative value" correction on first
//! progress report lives in [`crate::reconciler`].

use crate::model::job::AttackMode;
use crate::model::BaseKeyspace;

/// Standard hashcat charset class sizes used to size a brute-force mask
/// when no custom charset (`?1`..`?4`) is supplied.
#[derive(Debug, Clone, Copy)]
pub struct MaskCharsets {
    pub lower: i64,
    pub upper: i64,
    pub digit: i64,
    pub special: i64,
    pub all: i64,
}

impl Default for MaskCharsets {
    fn default() -> Self {
        Self {
            lower: 26,
            upper: 26,
            digit: 10,
            special: 33,
            all: 95,
        }
    }
}

/// Attack configuration as fed to the planner; a narrowed projection of
/// [`crate::model::Job`]'s configuration fields plus whatever external
/// facts (wordlist/hashlist sizes) the caller has already resolved.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    pub attack_mode: AttackMode,
    /// Candidate counts of each configured wordlist, in order. Straight
    /// mode uses all of them (summed); combinator and hybrid modes use
    /// exactly the first one or two per mode semantics.
    pub wordlist_counts: Vec<i64>,
    /// Total rule count across all configured rule files. Zero means "no
    /// rules configured", which the planner treats as factor 1 (§4.1,
    /// §8 boundary behavior).
    pub total_rule_count: i64,
    pub mask: Option<String>,
    /// Line count of the target hashlist, used only by mode 9.
    pub hashlist_line_count: i64,
}

/// Result of planning: the distilled spec's `(base_keyspace,
/// multiplication_factor)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedKeyspace {
    pub base_keyspace: BaseKeyspace,
    pub multiplication_factor: i64,
}

/// Abstracts the external engine's `--keyspace` call for straight-mode
/// wordlist sizing (§4.1: "implementers must call the external engine's
/// `--keyspace` for authoritative value"). Kept as a trait so the planner
/// is deterministic and testable without invoking hashcat; production code
/// supplies an implementation that shells out to the configured binary.
pub trait KeyspaceOracle: Send + Sync {
    /// Returns the base keyspace hashcat would report for a straight-mode
    /// attack against the given wordlists, or `None` if the oracle has no
    /// opinion (the planner then falls back to summing wordlist counts).
    fn straight_mode_keyspace(&self, wordlist_counts: &[i64]) -> Option<i64>;
}

/// Default oracle: sums wordlist counts, matching hashcat's behavior when
/// multiple wordlists are concatenated rather than combined. Good enough
/// for planning and for every test in this crate; a real deployment may
/// substitute a shelling-out oracle that asks hashcat directly.
pub struct SummingKeyspaceOracle;

impl KeyspaceOracle for SummingKeyspaceOracle {
    fn straight_mode_keyspace(&self, wordlist_counts: &[i64]) -> Option<i64> {
        wordlist_counts.iter().try_fold(0i64, |acc, &n| acc.checked_add(n))
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("keyspace arithmetic overflowed i64")]
    Overflow,
    #[error("attack configuration invalid: {0}")]
    InvalidConfig(String),
}

pub struct KeyspacePlanner<'a> {
    oracle: &'a dyn KeyspaceOracle,
    charsets: MaskCharsets,
}

impl<'a> KeyspacePlanner<'a> {
    pub fn new(oracle: &'a dyn KeyspaceOracle) -> Self {
        Self {
            oracle,
            charsets: MaskCharsets::default(),
        }
    }

    pub fn with_charsets(oracle: &'a dyn KeyspaceOracle, charsets: MaskCharsets) -> Self {
        Self { oracle, charsets }
    }

    /// Plans `base_keyspace` and `multiplication_factor` per §4.1's
    /// per-attack-mode rules. Any arithmetic that would overflow i64 is
    /// surfaced as [`PlanningError::Overflow`] — callers translate that
    /// into an `AccountingImpossible` error and park the job `pending`
    /// rather than scheduling it (§7).
    pub fn plan(&self, cfg: &AttackConfig) -> Result<PlannedKeyspace, PlanningError> {
        let base = match cfg.attack_mode {
            AttackMode::Straight => self
                .oracle
                .straight_mode_keyspace(&cfg.wordlist_counts)
                .ok_or(PlanningError::Overflow)?,
            AttackMode::Combinator => {
                let left = *cfg.wordlist_counts.first().unwrap_or(&0);
                let right = *cfg.wordlist_counts.get(1).unwrap_or(&0);
                left.checked_mul(right).ok_or(PlanningError::Overflow)?
            }
            AttackMode::Mask => {
                let mask = cfg
                    .mask
                    .as_deref()
                    .ok_or_else(|| PlanningError::InvalidConfig("mask mode requires a mask".into()))?;
                mask_keyspace(mask, &self.charsets)?
            }
            AttackMode::HybridWordlistMask | AttackMode::HybridMaskWordlist => {
                let wordlist = *cfg.wordlist_counts.first().unwrap_or(&0);
                let mask = cfg.mask.as_deref().ok_or_else(|| {
                    PlanningError::InvalidConfig("hybrid mode requires a mask".into())
                })?;
                let mask_ks = mask_keyspace(mask, &self.charsets)?;
                wordlist.checked_mul(mask_ks).ok_or(PlanningError::Overflow)?
            }
            AttackMode::Association => cfg.hashlist_line_count,
        };

        let factor = match cfg.attack_mode {
            AttackMode::Straight => {
                if cfg.total_rule_count <= 0 {
                    1
                } else {
                    cfg.total_rule_count
                }
            }
            AttackMode::Association => {
                if cfg.total_rule_count <= 0 {
                    1
                } else {
                    cfg.total_rule_count
                }
            }
            _ => 1,
        };

        if base < 0 {
            return Err(PlanningError::InvalidConfig("negative base keyspace".into()));
        }

        Ok(PlannedKeyspace {
            base_keyspace: BaseKeyspace(base),
            multiplication_factor: factor,
        })
    }

    /// Initial `effective_keyspace = base × factor` (§4.1), overflow-checked.
    pub fn initial_effective_keyspace(planned: &PlannedKeyspace) -> Result<i64, PlanningError> {
        planned
            .base_keyspace
            .0
            .checked_mul(planned.multiplication_factor)
            .ok_or(PlanningError::Overflow)
    }
}

/// Computes the keyspace of a hashcat mask string by multiplying the
/// per-position charset size. Supported placeholders: `?l` `?u` `?d` `?s`
/// `?a` (built-ins) and `?1`-`?4` (custom — treated as the "all" class
/// size since this planner has no custom-charset definitions to consult;
/// a production planner would thread those through from the job config).
/// Any other literal character contributes a charset size of 1.
fn mask_keyspace(mask: &str, charsets: &MaskCharsets) -> Result<i64, PlanningError> {
    let mut total: i64 = 1;
    let mut chars = mask.chars().peekable();
    while let Some(c) = chars.next() {
        let size = if c == '?' {
            match chars.next() {
                Some('l') => charsets.lower,
                Some('u') => charsets.upper,
                Some('d') => charsets.digit,
                Some('s') => charsets.special,
                Some('a') => charsets.all,
                Some('1') | Some('2') | Some('3') | Some('4') => charsets.all,
                Some(_) => 1,
                None => {
                    return Err(PlanningError::InvalidConfig(
                        "mask ends with a dangling '?'".into(),
                    ))
                }
            }
        } else {
            1
        };
        total = total.checked_mul(size).ok_or(PlanningError::Overflow)?;
    }
    if total <= 1 && mask.is_empty() {
        return Err(PlanningError::InvalidConfig("mask is empty".into()));
    }
    Ok(total)
}

/// Refines `avg_rule_multiplier` once the engine's first authoritative
/// progress report supplies `total_effective_keyspace` (§4.1, §4.7,
/// scenario S6). `rules_per_pass` is normally 1 except for rule-split jobs,
/// where each task only runs its own rule-chunk slice over the full base
/// keyspace, so the multiplier is computed per rule-chunk size instead of
/// across the whole rule file.
pub fn refine_avg_rule_multiplier(
    effective_reported: i64,
    base_keyspace: i64,
    rules_per_pass: i64,
) -> f64 {
    let denom = (base_keyspace as f64) * (rules_per_pass.max(1) as f64);
    if denom <= 0.0 {
        return 1.0;
    }
    effective_reported as f64 / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(mode: AttackMode) -> AttackConfig {
        AttackConfig {
            attack_mode: mode,
            wordlist_counts: vec![],
            total_rule_count: 0,
            mask: None,
            hashlist_line_count: 0,
        }
    }

    #[test]
    fn straight_mode_sums_wordlists_and_defaults_factor_to_one() {
        let oracle = SummingKeyspaceOracle;
        let planner = KeyspacePlanner::new(&oracle);
        let mut c = cfg(AttackMode::Straight);
        c.wordlist_counts = vec![1_000_000];
        let planned = planner.plan(&c).unwrap();
        assert_eq!(planned.base_keyspace.0, 1_000_000);
        assert_eq!(planned.multiplication_factor, 1);
    }

    #[test]
    fn straight_mode_factor_is_total_rule_count() {
        let oracle = SummingKeyspaceOracle;
        let planner = KeyspacePlanner::new(&oracle);
        let mut c = cfg(AttackMode::Straight);
        c.wordlist_counts = vec![1_000_000];
        c.total_rule_count = 64;
        let planned = planner.plan(&c).unwrap();
        assert_eq!(planned.multiplication_factor, 64);
    }

    #[test]
    fn combinator_mode_multiplies_left_and_right() {
        let oracle = SummingKeyspaceOracle;
        let planner = KeyspacePlanner::new(&oracle);
        let mut c = cfg(AttackMode::Combinator);
        c.wordlist_counts = vec![100, 200];
        let planned = planner.plan(&c).unwrap();
        assert_eq!(planned.base_keyspace.0, 20_000);
        assert_eq!(planned.multiplication_factor, 1);
    }

    #[test]
    fn mask_mode_multiplies_per_position_charset_sizes() {
        let oracle = SummingKeyspaceOracle;
        let planner = KeyspacePlanner::new(&oracle);
        let mut c = cfg(AttackMode::Mask);
        c.mask = Some("?l?l?d?d".to_string());
        let planned = planner.plan(&c).unwrap();
        assert_eq!(planned.base_keyspace.0, 26 * 26 * 10 * 10);
    }

    #[test]
    fn hybrid_mode_multiplies_wordlist_by_mask() {
        let oracle = SummingKeyspaceOracle;
        let planner = KeyspacePlanner::new(&oracle);
        let mut c = cfg(AttackMode::HybridWordlistMask);
        c.wordlist_counts = vec![500];
        c.mask = Some("?d?d".to_string());
        let planned = planner.plan(&c).unwrap();
        assert_eq!(planned.base_keyspace.0, 500 * 100);
    }

    #[test]
    fn association_mode_uses_hashlist_line_count_and_rule_factor() {
        let oracle = SummingKeyspaceOracle;
        let planner = KeyspacePlanner::new(&oracle);
        let mut c = cfg(AttackMode::Association);
        c.hashlist_line_count = 42;
        c.total_rule_count = 3;
        let planned = planner.plan(&c).unwrap();
        assert_eq!(planned.base_keyspace.0, 42);
        assert_eq!(planned.multiplication_factor, 3);
    }

    #[test]
    fn association_mode_defaults_factor_to_one_without_rules() {
        let oracle = SummingKeyspaceOracle;
        let planner = KeyspacePlanner::new(&oracle);
        let mut c = cfg(AttackMode::Association);
        c.hashlist_line_count = 42;
        let planned = planner.plan(&c).unwrap();
        assert_eq!(planned.multiplication_factor, 1);
    }

    #[test]
    fn overflowing_mask_keyspace_is_reported_as_overflow() {
        let oracle = SummingKeyspaceOracle;
        let planner = KeyspacePlanner::new(&oracle);
        let mut c = cfg(AttackMode::Mask);
        c.mask = Some("?a".repeat(10)); // 95^10 overflows i64
        assert_eq!(planner.plan(&c), Err(PlanningError::Overflow));
    }

    #[test]
    fn mask_requires_a_mask_string() {
        let oracle = SummingKeyspaceOracle;
        let planner = KeyspacePlanner::new(&oracle);
        let c = cfg(AttackMode::Mask);
        assert!(planner.plan(&c).is_err());
    }

    #[test]
    fn avg_rule_multiplier_refines_from_authoritative_report() {
        // base=1e9, factor estimated at 1e5 rules but engine only ran 8.7e13
        let refined = refine_avg_rule_multiplier(87_000_000_000_000, 1_000_000_000, 1);
        assert!((refined - 87_000.0).abs() < 1.0);
    }

    #[test]
    fn initial_effective_keyspace_multiplies_base_by_factor() {
        let planned = PlannedKeyspace {
            base_keyspace: BaseKeyspace(1_000),
            multiplication_factor: 50,
        };
        assert_eq!(
            KeyspacePlanner::initial_effective_keyspace(&planned).unwrap(),
            50_000
        );
    }
}
