//! In-memory row stores for campaigns, steps, and lead memberships.
//!
//! Campaigns and steps are keyed by `(tenant_id, campaign_id)` so identifier
//! collisions across tenants can never alias. The membership store is the
//! only store mutated by concurrent runs; every mutation is a conditional
//! single-row update performed while holding that row's map entry, which is
//! what makes the claim in [`MembershipStore::claim`] safe against
//! overlapping invocations.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use drip_core::campaign::{
    Campaign, CampaignStatus, LeadMembership, MembershipStatus, SequenceStep,
};
use drip_core::{DripError, DripResult};

/// Tenant-scoped campaign definitions.
#[derive(Default)]
pub struct CampaignStore {
    campaigns: DashMap<(Uuid, Uuid), Campaign>,
}

impl CampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, campaign: Campaign) {
        self.campaigns
            .insert((campaign.tenant_id, campaign.id), campaign);
    }

    /// Look up a campaign strictly within its tenant.
    pub fn get(&self, tenant_id: Uuid, campaign_id: Uuid) -> Option<Campaign> {
        self.campaigns
            .get(&(tenant_id, campaign_id))
            .map(|e| e.value().clone())
    }

    /// Every tenant's campaigns with `Active` status — the trigger
    /// dispatcher's fan-out set.
    pub fn list_active(&self) -> Vec<Campaign> {
        self.campaigns
            .iter()
            .filter(|e| e.value().status == CampaignStatus::Active)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn set_status(&self, tenant_id: Uuid, campaign_id: Uuid, status: CampaignStatus) {
        if let Some(mut entry) = self.campaigns.get_mut(&(tenant_id, campaign_id)) {
            entry.status = status;
            entry.updated_at = Utc::now();
        }
    }

    /// Best-effort aggregate counter bump; never load-bearing for the state
    /// machine.
    pub fn add_sent(&self, tenant_id: Uuid, campaign_id: Uuid, count: u64) {
        if let Some(mut entry) = self.campaigns.get_mut(&(tenant_id, campaign_id)) {
            entry.stats.sent += count;
            entry.updated_at = Utc::now();
        }
    }
}

/// Ordered step lists, read-only during an execution pass.
#[derive(Default)]
pub struct StepStore {
    steps: DashMap<(Uuid, Uuid), Vec<SequenceStep>>,
}

impl StepStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a campaign's step list. Steps are stored sorted by index.
    pub fn put_steps(&self, tenant_id: Uuid, campaign_id: Uuid, mut steps: Vec<SequenceStep>) {
        steps.sort_by_key(|s| s.index);
        self.steps.insert((tenant_id, campaign_id), steps);
    }

    /// Snapshot of the campaign's ordered steps for one invocation.
    pub fn steps_for(&self, tenant_id: Uuid, campaign_id: Uuid) -> Vec<SequenceStep> {
        self.steps
            .get(&(tenant_id, campaign_id))
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }
}

/// Per-(campaign, recipient) progression rows.
#[derive(Default)]
pub struct MembershipStore {
    rows: DashMap<Uuid, LeadMembership>,
}

impl MembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll a recipient into a campaign. `next_step_due` carries step 0's
    /// initial wait (`None` = due immediately). Fails on a duplicate address
    /// within the same campaign.
    pub fn enroll(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        email: &str,
        next_step_due: Option<DateTime<Utc>>,
    ) -> DripResult<LeadMembership> {
        let duplicate = self.rows.iter().any(|e| {
            let m = e.value();
            m.tenant_id == tenant_id && m.campaign_id == campaign_id && m.email == email
        });
        if duplicate {
            return Err(DripError::DuplicateEnrollment {
                campaign_id,
                email: email.to_string(),
            });
        }

        let membership = LeadMembership {
            id: Uuid::new_v4(),
            campaign_id,
            tenant_id,
            email: email.to_string(),
            status: MembershipStatus::Active,
            current_step: 0,
            next_step_due,
            claimed_at: None,
            joined_at: Utc::now(),
            completed_at: None,
            opens: 0,
            clicks: 0,
            replies: 0,
        };
        self.rows.insert(membership.id, membership.clone());
        Ok(membership)
    }

    pub fn insert(&self, membership: LeadMembership) {
        self.rows.insert(membership.id, membership);
    }

    pub fn get(&self, id: Uuid) -> Option<LeadMembership> {
        self.rows.get(&id).map(|e| e.value().clone())
    }

    /// All memberships of one campaign, strictly tenant-scoped.
    pub fn for_campaign(&self, tenant_id: Uuid, campaign_id: Uuid) -> Vec<LeadMembership> {
        self.rows
            .iter()
            .filter(|e| {
                let m = e.value();
                m.tenant_id == tenant_id && m.campaign_id == campaign_id
            })
            .map(|e| e.value().clone())
            .collect()
    }

    /// Count of `Active` rows for one campaign.
    pub fn active_count(&self, tenant_id: Uuid, campaign_id: Uuid) -> u64 {
        self.rows
            .iter()
            .filter(|e| {
                let m = e.value();
                m.tenant_id == tenant_id
                    && m.campaign_id == campaign_id
                    && m.status == MembershipStatus::Active
            })
            .count() as u64
    }

    /// Conditional claim: transition the row to `Processing` only if it is
    /// still eligible at `now`. Returns the claimed snapshot, or `None` when
    /// another invocation got there first (a no-op for the caller, not an
    /// error). A row already in `Processing` may be reclaimed once its claim
    /// is older than `stale_after`.
    pub fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        force: bool,
        stale_after: Duration,
    ) -> Option<LeadMembership> {
        let mut entry = self.rows.get_mut(&id)?;
        let eligible = match entry.status {
            MembershipStatus::Active => force || entry.is_due(now),
            MembershipStatus::Processing => entry
                .claimed_at
                .map_or(true, |claimed| claimed + stale_after <= now),
            _ => false,
        };
        if !eligible {
            return None;
        }
        entry.status = MembershipStatus::Processing;
        entry.claimed_at = Some(now);
        Some(entry.clone())
    }

    /// Revert a claim after a dispatch failure or abandoned pass, leaving
    /// `current_step` and `next_step_due` untouched for the next trigger.
    pub fn release(&self, id: Uuid) {
        if let Some(mut entry) = self.rows.get_mut(&id) {
            if entry.status == MembershipStatus::Processing {
                entry.status = MembershipStatus::Active;
                entry.claimed_at = None;
            }
        }
    }

    /// Record a successful send: advance the step cursor, stamp the next due
    /// time, and either re-arm the row or complete it.
    pub fn record_sent(
        &self,
        id: Uuid,
        next_due: Option<DateTime<Utc>>,
        sequence_complete: bool,
        now: DateTime<Utc>,
    ) {
        if let Some(mut entry) = self.rows.get_mut(&id) {
            entry.current_step += 1;
            entry.next_step_due = next_due;
            entry.claimed_at = None;
            if sequence_complete {
                entry.status = MembershipStatus::Completed;
                entry.completed_at = Some(now);
            } else {
                entry.status = MembershipStatus::Active;
            }
        }
    }

    /// Complete a membership whose cursor is already past the last step.
    pub fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) {
        if let Some(mut entry) = self.rows.get_mut(&id) {
            entry.status = MembershipStatus::Completed;
            entry.completed_at = Some(now);
            entry.claimed_at = None;
        }
    }

    /// Administrative bulk reset: every membership of the campaign back to
    /// step 0 and active, with `next_step_due` carrying step 0's initial
    /// wait again. Returns the number of rows touched.
    pub fn reset_campaign(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        next_step_due: Option<DateTime<Utc>>,
    ) -> usize {
        let mut touched = 0;
        for mut entry in self.rows.iter_mut() {
            let m = entry.value_mut();
            if m.tenant_id != tenant_id || m.campaign_id != campaign_id {
                continue;
            }
            m.status = MembershipStatus::Active;
            m.current_step = 0;
            m.next_step_due = next_step_due;
            m.claimed_at = None;
            m.completed_at = None;
            touched += 1;
        }
        info!(campaign_id = %campaign_id, touched, "Campaign memberships reset");
        touched
    }
}
