//! Core domain records: campaigns, sequence steps, lead memberships, and
//! execution log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant-scoped drip campaign definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub kind: CampaignKind,
    pub status: CampaignStatus,
    /// Best-effort aggregate counters, not a source of truth.
    pub stats: CampaignStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What kind of campaign this is. Only timed sequences exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    Sequence,
}

/// Lifecycle status of a campaign definition. Only `Active` campaigns are
/// eligible for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

/// Denormalized engagement totals maintained on the campaign row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CampaignStats {
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub replied: u64,
}

/// One ordered unit of a campaign's sequence: a message template plus the
/// delay before it becomes eligible, relative to the prior step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub campaign_id: Uuid,
    /// 0-based, contiguous within a campaign.
    pub index: u32,
    /// Delay from the previous step in seconds. Step 0's delay is the
    /// initial wait after enrollment.
    pub delay_secs: u64,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
}

/// Per-(campaign, recipient) progression record. The only record mutated
/// concurrently by overlapping runs; all mutation goes through the
/// conditional claim in the membership store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadMembership {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub tenant_id: Uuid,
    /// Recipient address, unique within a campaign.
    pub email: String,
    pub status: MembershipStatus,
    /// How many steps have been successfully sent. Monotone non-decreasing.
    pub current_step: u32,
    /// When the next step becomes due. `None` means due immediately.
    pub next_step_due: Option<DateTime<Utc>>,
    /// Set while status is `Processing`; lets a later invocation reclaim a
    /// row abandoned by a crashed or timed-out worker.
    pub claimed_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub opens: u64,
    pub clicks: u64,
    pub replies: u64,
}

impl LeadMembership {
    /// True if the membership is selectable at `now`: active and either due
    /// immediately or past its due time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == MembershipStatus::Active
            && self.next_step_due.map_or(true, |due| due <= now)
    }
}

/// Runtime status of a membership. `Processing` is the transient claim
/// marker held for the duration of one step's dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Processing,
    Completed,
    Bounced,
    Removed,
}

/// Kind of an execution log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    Queued,
    Sent,
    Failed,
    Completed,
    Skipped,
}

/// Append-only execution log record, immutable once written. Hash-chained to
/// its predecessor so tampering is detectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub id: Uuid,
    pub sequence: u64,
    pub campaign_id: Uuid,
    /// `None` for campaign-level events (e.g. a bulk reset).
    pub membership_id: Option<Uuid>,
    pub kind: LogEventKind,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    pub entry_hash: String,
    pub previous_hash: String,
}

/// Aggregated outcome of one campaign runner invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Steps dispatched successfully this pass.
    pub sent: u64,
    /// Active memberships that were not yet due.
    pub delayed: u64,
    /// Dispatch failures (including timeouts); retried on a later pass.
    pub failed: u64,
    /// Memberships that reached the end of the sequence this pass.
    pub completed: u64,
    /// Campaign-level failure (not found, inactive, store unavailable).
    /// Per-membership failures never populate this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    /// A zero-count result carrying a campaign-level error.
    pub fn from_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_due_semantics() {
        let now = Utc::now();
        let mut m = LeadMembership {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "lead@example.com".into(),
            status: MembershipStatus::Active,
            current_step: 0,
            next_step_due: None,
            claimed_at: None,
            joined_at: now,
            completed_at: None,
            opens: 0,
            clicks: 0,
            replies: 0,
        };

        // Null due time means due immediately.
        assert!(m.is_due(now));

        // A future due time excludes the membership.
        m.next_step_due = Some(now + chrono::Duration::seconds(60));
        assert!(!m.is_due(now));

        // An elapsed due time includes it again.
        m.next_step_due = Some(now - chrono::Duration::seconds(1));
        assert!(m.is_due(now));

        // Status always gates, regardless of due time.
        m.status = MembershipStatus::Completed;
        assert!(!m.is_due(now));
    }

    #[test]
    fn test_run_result_error_serialization() {
        let ok = RunResult {
            sent: 2,
            ..RunResult::default()
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["sent"], 2);
        assert!(json.get("error").is_none());

        let err = RunResult::from_error("campaign not found");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "campaign not found");
    }
}
