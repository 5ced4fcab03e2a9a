//! C3 — Rule Splitter.
//!
//! Decides whether a rule-based job needs splitting and, if so, computes
//! the rule-index sub-ranges each materializes as a temporary rule file
//! (§4.3). File materialization and cleanup are modeled behind
//! [`RuleFileStore`] so the planning arithmetic is testable without
//! touching the filesystem.

use std::path::PathBuf;

use crate::model::BaseKeyspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleChunkRange {
    pub rule_start_index: i64,
    pub rule_end_index: i64,
}

impl RuleChunkRange {
    pub fn len(&self) -> i64 {
        self.rule_end_index - self.rule_start_index
    }
}

/// Decides whether §4.3's triggering condition holds: rule splitting is
/// enabled for the job, the slowest eligible agent's full-keyspace pass
/// (including rules) would exceed `chunk_duration × threshold`, and the
/// rule file has enough rules to bother splitting.
pub fn should_split(
    uses_rule_splitting: bool,
    base_keyspace: BaseKeyspace,
    total_rule_count: i64,
    slowest_eligible_hashes_per_second: f64,
    chunk_duration_secs: i64,
    rule_split_threshold: f64,
    min_rules_to_split: i64,
) -> bool {
    if !uses_rule_splitting || total_rule_count < min_rules_to_split {
        return false;
    }
    if slowest_eligible_hashes_per_second <= 0.0 {
        return false;
    }
    let full_pass_secs =
        (base_keyspace.0 as f64 * total_rule_count as f64) / slowest_eligible_hashes_per_second;
    full_pass_secs > (chunk_duration_secs as f64) * rule_split_threshold
}

/// Computes rule-index chunks sized so that one chunk's full base-keyspace
/// pass at `median_agent_hashes_per_second` takes approximately
/// `chunk_duration_secs`, refining the chunk count upward (finer slices)
/// until per-task time is within `chunk_duration × (1 + fluctuation)`,
/// capped at `max_rule_chunks` (§4.3, scenario S5).
pub fn compute_rule_chunks(
    base_keyspace: BaseKeyspace,
    total_rule_count: i64,
    median_agent_hashes_per_second: f64,
    chunk_duration_secs: i64,
    fluctuation_pct: i64,
    max_rule_chunks: i64,
) -> Vec<RuleChunkRange> {
    if total_rule_count <= 0 || median_agent_hashes_per_second <= 0.0 || chunk_duration_secs <= 0 {
        return vec![RuleChunkRange {
            rule_start_index: 0,
            rule_end_index: total_rule_count.max(1),
        }];
    }

    let target_cap = (chunk_duration_secs as f64) * (1.0 + fluctuation_pct as f64 / 100.0);
    // Rules a single chunk can carry so its full-keyspace pass stays within
    // the target: rules_per_chunk * base / speed <= target_cap.
    let mut rules_per_chunk =
        ((target_cap * median_agent_hashes_per_second) / base_keyspace.0.max(1) as f64).floor() as i64;
    rules_per_chunk = rules_per_chunk.max(1);

    let mut chunk_count = (total_rule_count + rules_per_chunk - 1) / rules_per_chunk;
    if chunk_count > max_rule_chunks {
        chunk_count = max_rule_chunks;
        rules_per_chunk = (total_rule_count + chunk_count - 1) / chunk_count;
    }
    // Iterate finer until the per-chunk time is within the target cap or
    // we hit the max_rule_chunks ceiling (§4.3's "iterating the chunk
    // count upward" instruction).
    loop {
        let per_chunk_secs =
            (rules_per_chunk as f64 * base_keyspace.0 as f64) / median_agent_hashes_per_second;
        let current_chunks = (total_rule_count + rules_per_chunk - 1) / rules_per_chunk;
        if per_chunk_secs <= target_cap || current_chunks >= max_rule_chunks {
            break;
        }
        rules_per_chunk = (rules_per_chunk / 2).max(1);
        if rules_per_chunk == 1 {
            break;
        }
    }

    let mut ranges = Vec::new();
    let mut start = 0i64;
    while start < total_rule_count && (ranges.len() as i64) < max_rule_chunks {
        let end = (start + rules_per_chunk).min(total_rule_count);
        ranges.push(RuleChunkRange {
            rule_start_index: start,
            rule_end_index: end,
        });
        start = end;
    }
    // Tail absorption: fold any leftover rules (hit max_rule_chunks before
    // covering the whole file) into the final chunk rather than dropping
    // them.
    if start < total_rule_count {
        if let Some(last) = ranges.last_mut() {
            last.rule_end_index = total_rule_count;
        }
    }
    ranges
}

/// One materialized rule-chunk file: its index range plus the path a task
/// will reference. Created on demand (§4.3) and deleted once every
/// referencing task is terminal, or unconditionally on job terminal status.
#[derive(Debug, Clone)]
pub struct RuleChunkFile {
    pub range: RuleChunkRange,
    pub path: PathBuf,
}

/// Materializes and cleans up rule-chunk files. The distilled spec treats
/// wordlist/rule file *storage* as an external collaborator; this trait is
/// the narrow seam the rule splitter needs into that collaborator, kept
/// separate from the pure planning arithmetic above so tests never touch a
/// filesystem.
pub trait RuleFileStore: Send + Sync {
    fn materialize(
        &self,
        job_id: uuid::Uuid,
        source_rule_paths: &[String],
        range: RuleChunkRange,
    ) -> std::io::Result<PathBuf>;

    fn delete(&self, path: &PathBuf) -> std::io::Result<()>;
}

/// Writes each rule-chunk's line slice into `{chunk_dir}/{job_id}/{start}-{end}.rule`.
pub struct FilesystemRuleStore {
    pub chunk_dir: PathBuf,
}

impl RuleFileStore for FilesystemRuleStore {
    fn materialize(
        &self,
        job_id: uuid::Uuid,
        source_rule_paths: &[String],
        range: RuleChunkRange,
    ) -> std::io::Result<PathBuf> {
        use std::io::{BufRead, BufReader, Write};

        let dir = self.chunk_dir.join(job_id.to_string());
        std::fs::create_dir_all(&dir)?;
        let dest = dir.join(format!("{}-{}.rule", range.rule_start_index, range.rule_end_index));
        let mut out = std::fs::File::create(&dest)?;

        let mut index = 0i64;
        'outer: for source_path in source_rule_paths {
            let file = std::fs::File::open(source_path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if index >= range.rule_start_index && index < range.rule_end_index {
                    writeln!(out, "{line}")?;
                }
                index += 1;
                if index >= range.rule_end_index {
                    break 'outer;
                }
            }
        }
        Ok(dest)
    }

    fn delete(&self, path: &PathBuf) -> std::io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_split_is_false_when_disabled() {
        assert!(!should_split(false, BaseKeyspace(1_000_000_000), 100_000, 1e8, 60, 2.0, 10_000));
    }

    #[test]
    fn should_split_is_false_below_min_rules() {
        assert!(!should_split(true, BaseKeyspace(1_000_000_000), 10, 1e8, 60, 2.0, 10_000));
    }

    #[test]
    fn should_split_triggers_on_long_full_pass() {
        // base=1e9, rules=1e5, speed=1e8 -> full pass = 1e9*1e5/1e8 = 1e6s >> 60*2
        assert!(should_split(true, BaseKeyspace(1_000_000_000), 100_000, 1e8, 60, 2.0, 10_000));
    }

    #[test]
    fn compute_rule_chunks_covers_entire_rule_file_without_gaps() {
        let chunks = compute_rule_chunks(BaseKeyspace(1_000_000_000), 100_000, 1e8, 60, 10, 50_000);
        assert_eq!(chunks.first().unwrap().rule_start_index, 0);
        assert_eq!(chunks.last().unwrap().rule_end_index, 100_000);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].rule_end_index, pair[1].rule_start_index);
        }
    }

    #[test]
    fn compute_rule_chunks_respects_max_rule_chunks_cap() {
        let chunks = compute_rule_chunks(BaseKeyspace(1_000_000_000), 100_000, 1e8, 60, 10, 50);
        assert!(chunks.len() <= 50);
        assert_eq!(chunks.last().unwrap().rule_end_index, 100_000);
    }

    #[test]
    fn scenario_s5_produces_at_least_ten_thousand_chunks() {
        // S5: base=1e9, rules=1e5, speed=1e8, chunk_duration=60
        let chunks = compute_rule_chunks(
            BaseKeyspace(1_000_000_000),
            100_000,
            1e8,
            60,
            0,
            50_000,
        );
        assert!(chunks.len() >= 10_000, "got {} chunks", chunks.len());
    }
}
