//! Append-only execution log with tamper-evident hash chaining.
//!
//! Entries are created only by the campaign runner and never updated or
//! deleted. Each entry carries a SHA-256 hash over its content plus the hash
//! of its predecessor, so out-of-band mutation of history is detectable.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use drip_core::campaign::{ExecutionLogEntry, LogEventKind};

/// Append-only, hash-chained event recorder for campaign execution.
pub struct ExecutionLog {
    entries: DashMap<Uuid, ExecutionLogEntry>,
    sequence: parking_lot::Mutex<u64>,
    last_hash: parking_lot::Mutex<String>,
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionLog {
    /// Create an empty log with the genesis hash.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            sequence: parking_lot::Mutex::new(0),
            last_hash: parking_lot::Mutex::new("genesis".to_string()),
        }
    }

    /// Append one event. `membership_id` is `None` for campaign-level events.
    pub fn record(
        &self,
        campaign_id: Uuid,
        membership_id: Option<Uuid>,
        kind: LogEventKind,
        detail: impl Into<String>,
    ) -> ExecutionLogEntry {
        let mut entry = ExecutionLogEntry {
            id: Uuid::new_v4(),
            sequence: 0,
            campaign_id,
            membership_id,
            kind,
            detail: detail.into(),
            timestamp: Utc::now(),
            entry_hash: String::new(),
            previous_hash: String::new(),
        };

        let mut seq = self.sequence.lock();
        *seq += 1;
        entry.sequence = *seq;

        let mut prev_hash = self.last_hash.lock();
        entry.previous_hash = prev_hash.clone();
        entry.entry_hash = hash_entry(&entry);
        *prev_hash = entry.entry_hash.clone();
        drop(prev_hash);
        drop(seq);

        debug!(
            campaign_id = %entry.campaign_id,
            sequence = entry.sequence,
            kind = ?entry.kind,
            "Execution event recorded"
        );
        self.entries.insert(entry.id, entry.clone());
        entry
    }

    /// Entries for one campaign, newest first, optionally filtered by kind
    /// and membership.
    pub fn query(
        &self,
        campaign_id: Uuid,
        membership_id: Option<Uuid>,
        kind: Option<LogEventKind>,
        limit: usize,
    ) -> Vec<ExecutionLogEntry> {
        let mut results: Vec<ExecutionLogEntry> = self
            .entries
            .iter()
            .filter(|e| {
                let ev = e.value();
                if ev.campaign_id != campaign_id {
                    return false;
                }
                if let Some(m) = membership_id {
                    if ev.membership_id != Some(m) {
                        return false;
                    }
                }
                if let Some(k) = kind {
                    if ev.kind != k {
                        return false;
                    }
                }
                true
            })
            .map(|e| e.value().clone())
            .collect();

        results.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        results.truncate(limit);
        results
    }

    /// Number of entries of one kind for a campaign.
    pub fn count_kind(&self, campaign_id: Uuid, kind: LogEventKind) -> usize {
        self.entries
            .iter()
            .filter(|e| e.value().campaign_id == campaign_id && e.value().kind == kind)
            .count()
    }

    /// Verify the whole chain from genesis.
    pub fn verify_chain(&self) -> ChainVerification {
        let mut entries: Vec<ExecutionLogEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.sequence);

        let total = entries.len();
        let mut valid = 0;
        let mut tampered = Vec::new();
        let mut expected_prev = "genesis".to_string();

        for entry in &entries {
            if entry.previous_hash != expected_prev || hash_entry(entry) != entry.entry_hash {
                tampered.push(entry.sequence);
            } else {
                valid += 1;
            }
            expected_prev = entry.entry_hash.clone();
        }

        ChainVerification {
            total_entries: total,
            valid_entries: valid,
            tampered_sequences: tampered,
            chain_intact: valid == total,
        }
    }
}

/// Result of verifying the execution log chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub tampered_sequences: Vec<u64>,
    pub chain_intact: bool,
}

fn kind_label(kind: LogEventKind) -> &'static str {
    match kind {
        LogEventKind::Queued => "queued",
        LogEventKind::Sent => "sent",
        LogEventKind::Failed => "failed",
        LogEventKind::Completed => "completed",
        LogEventKind::Skipped => "skipped",
    }
}

/// SHA-256 over sequence, campaign, kind, detail, timestamp, previous hash.
fn hash_entry(entry: &ExecutionLogEntry) -> String {
    let content = format!(
        "{}:{}:{}:{}:{}:{}",
        entry.sequence,
        entry.campaign_id,
        kind_label(entry.kind),
        entry.detail,
        entry.timestamp.to_rfc3339(),
        entry.previous_hash,
    );
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
