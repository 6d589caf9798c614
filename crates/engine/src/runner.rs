//! Campaign runner — advances every due membership of one campaign by one
//! step, exactly once, per invocation.
//!
//! The runner never spawns its own background loop; it is invoked by the
//! trigger dispatcher or a manual administrative call, does a bounded unit of
//! work, and returns. Overlapping invocations are tolerated through the
//! per-row conditional claim, not prevented.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use drip_core::campaign::{
    Campaign, CampaignStatus, LeadMembership, LogEventKind, MembershipStatus, RunResult,
    SequenceStep,
};
use drip_core::config::EngineConfig;
use drip_core::dispatch::{MailDispatcher, OutboundMessage};
use drip_core::{DripError, DripResult};

use crate::evaluator::{self, NextAction};
use crate::log::ExecutionLog;
use crate::selector::EligibilitySelector;
use crate::store::{CampaignStore, MembershipStore, StepStore};

/// Per-invocation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Bypass the due-time comparison (manual re-runs). Never bypasses the
    /// membership status gate, and also allows running a non-active campaign.
    pub force: bool,
    /// Abandon the remainder of the batch past this point. Unresolved rows
    /// stay claimable via the staleness threshold.
    pub deadline: Option<Instant>,
}

/// Orchestrates selection, evaluation, dispatch, state update, and logging
/// for one campaign invocation.
pub struct CampaignRunner {
    campaigns: Arc<CampaignStore>,
    steps: Arc<StepStore>,
    memberships: Arc<MembershipStore>,
    selector: EligibilitySelector,
    log: Arc<ExecutionLog>,
    dispatcher: Arc<dyn MailDispatcher>,
    config: EngineConfig,
}

impl CampaignRunner {
    pub fn new(
        campaigns: Arc<CampaignStore>,
        steps: Arc<StepStore>,
        memberships: Arc<MembershipStore>,
        log: Arc<ExecutionLog>,
        dispatcher: Arc<dyn MailDispatcher>,
        config: EngineConfig,
    ) -> Self {
        let selector = EligibilitySelector::new(memberships.clone());
        Self {
            campaigns,
            steps,
            memberships,
            selector,
            log,
            dispatcher,
            config,
        }
    }

    /// Execute one pass over the campaign. Per-membership failures are
    /// counted, never raised; only campaign-level lookup failures populate
    /// `RunResult.error`.
    pub async fn run(&self, campaign_id: Uuid, tenant_id: Uuid, options: RunOptions) -> RunResult {
        metrics::counter!("dripflow.runs").increment(1);

        let campaign = match self.campaigns.get(tenant_id, campaign_id) {
            Some(c) => c,
            None => {
                return RunResult::from_error(
                    DripError::CampaignNotFound(campaign_id, tenant_id).to_string(),
                )
            }
        };
        if campaign.status != CampaignStatus::Active && !options.force {
            return RunResult::from_error(DripError::CampaignInactive(campaign_id).to_string());
        }

        // Snapshot the step list for the whole pass; edits land next pass.
        let steps = self.steps.steps_for(tenant_id, campaign_id);
        if steps.is_empty() {
            debug!(campaign_id = %campaign_id, "Campaign has no steps, nothing to do");
            return RunResult::default();
        }

        let now = Utc::now();
        let stale_after = chrono::Duration::seconds(self.config.claim_stale_secs as i64);
        let eligible = self
            .selector
            .select(tenant_id, campaign_id, now, options.force, stale_after);
        let eligible_active = eligible
            .iter()
            .filter(|m| m.status == MembershipStatus::Active)
            .count() as u64;
        let active_total = self.memberships.active_count(tenant_id, campaign_id);

        let mut result = RunResult {
            delayed: active_total.saturating_sub(eligible_active),
            ..RunResult::default()
        };

        let batch_size = eligible.len();
        for (position, membership) in eligible.into_iter().enumerate() {
            if let Some(deadline) = options.deadline {
                if Instant::now() >= deadline {
                    let remaining = batch_size - position;
                    debug!(
                        campaign_id = %campaign_id,
                        remaining,
                        "Run deadline reached, abandoning remainder of batch"
                    );
                    self.log.record(
                        campaign_id,
                        None,
                        LogEventKind::Skipped,
                        format!("run deadline reached, {remaining} memberships deferred"),
                    );
                    break;
                }
            }
            self.process_membership(&campaign, &steps, membership.id, options.force, &mut result)
                .await;
        }

        if result.sent > 0 {
            self.campaigns.add_sent(tenant_id, campaign_id, result.sent);
        }

        info!(
            campaign_id = %campaign_id,
            tenant_id = %tenant_id,
            sent = result.sent,
            delayed = result.delayed,
            failed = result.failed,
            completed = result.completed,
            "Campaign run finished"
        );
        result
    }

    /// Claim, evaluate, dispatch, and update one membership. A lost claim
    /// race is a silent no-op.
    async fn process_membership(
        &self,
        campaign: &Campaign,
        steps: &[SequenceStep],
        membership_id: Uuid,
        force: bool,
        result: &mut RunResult,
    ) {
        let now = Utc::now();
        let stale_after = chrono::Duration::seconds(self.config.claim_stale_secs as i64);

        // Another invocation may have claimed or advanced the row since
        // selection; losing the claim here is expected under overlap.
        let claimed = match self.memberships.claim(membership_id, now, force, stale_after) {
            Some(m) => m,
            None => return,
        };

        let step = match evaluator::next_step(steps, claimed.current_step) {
            NextAction::Send(step) => step,
            NextAction::SequenceComplete => {
                self.memberships.mark_completed(membership_id, now);
                self.log.record(
                    campaign.id,
                    Some(membership_id),
                    LogEventKind::Completed,
                    format!("{} finished the sequence", claimed.email),
                );
                result.completed += 1;
                return;
            }
        };

        match self.dispatch_step(&claimed, step).await {
            Ok(()) => {
                let sent_index = claimed.current_step;
                let sequence_complete = sent_index as usize + 1 >= steps.len();
                let next_due = evaluator::due_after_send(steps, sent_index, Utc::now());
                self.memberships
                    .record_sent(membership_id, next_due, sequence_complete, now);
                self.log.record(
                    campaign.id,
                    Some(membership_id),
                    LogEventKind::Sent,
                    format!("step {} sent to {}", step.index, claimed.email),
                );
                metrics::counter!("dripflow.steps_sent").increment(1);
                result.sent += 1;
                if sequence_complete {
                    self.log.record(
                        campaign.id,
                        Some(membership_id),
                        LogEventKind::Completed,
                        format!("{} finished the sequence", claimed.email),
                    );
                    metrics::counter!("dripflow.sequences_completed").increment(1);
                    result.completed += 1;
                }
            }
            Err(e) => {
                // Leave the cursor and due time untouched; the next periodic
                // trigger is the retry.
                self.memberships.release(membership_id);
                warn!(
                    campaign_id = %campaign.id,
                    membership_id = %membership_id,
                    error = %e,
                    "Step dispatch failed"
                );
                self.log.record(
                    campaign.id,
                    Some(membership_id),
                    LogEventKind::Failed,
                    format!("step {} to {}: {}", step.index, claimed.email, e),
                );
                metrics::counter!("dripflow.dispatch_failures").increment(1);
                result.failed += 1;
            }
        }
    }

    /// One dispatch attempt, bounded by the configured timeout.
    async fn dispatch_step(
        &self,
        membership: &LeadMembership,
        step: &SequenceStep,
    ) -> DripResult<()> {
        let message = OutboundMessage {
            to: membership.email.clone(),
            subject: step.subject.clone(),
            body_html: step.body_html.clone(),
            body_text: step.body_text.clone(),
        };
        let timeout = Duration::from_millis(self.config.dispatch_timeout_ms);
        match tokio::time::timeout(timeout, self.dispatcher.send(&message)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DripError::DispatchTimeout(self.config.dispatch_timeout_ms)),
        }
    }

    /// Enroll a recipient into a campaign and queue them at step 0. Step 0's
    /// delay is honored as the initial wait from enrollment.
    pub fn enroll(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        email: &str,
    ) -> DripResult<LeadMembership> {
        let campaign = self
            .campaigns
            .get(tenant_id, campaign_id)
            .ok_or(DripError::CampaignNotFound(campaign_id, tenant_id))?;
        let steps = self.steps.steps_for(tenant_id, campaign_id);
        let initial_due = evaluator::initial_due(&steps, Utc::now());
        let membership = self
            .memberships
            .enroll(tenant_id, campaign_id, email, initial_due)?;
        self.log.record(
            campaign.id,
            Some(membership.id),
            LogEventKind::Queued,
            format!("{} enrolled", email),
        );
        Ok(membership)
    }

    /// Administrative bulk reset of every membership of the campaign, back
    /// to step 0 with step 0's initial wait re-applied. Tenant-scoped like
    /// every other path.
    pub fn reset(&self, campaign_id: Uuid, tenant_id: Uuid) -> DripResult<usize> {
        let campaign = self
            .campaigns
            .get(tenant_id, campaign_id)
            .ok_or(DripError::CampaignNotFound(campaign_id, tenant_id))?;
        let steps = self.steps.steps_for(tenant_id, campaign_id);
        let initial_due = evaluator::initial_due(&steps, Utc::now());
        let touched = self
            .memberships
            .reset_campaign(tenant_id, campaign_id, initial_due);
        self.log.record(
            campaign.id,
            None,
            LogEventKind::Queued,
            format!("sequence reset, {touched} memberships re-queued"),
        );
        Ok(touched)
    }

    /// Tenant-scoped campaign lookup for the API layer.
    pub fn campaign(&self, campaign_id: Uuid, tenant_id: Uuid) -> Option<Campaign> {
        self.campaigns.get(tenant_id, campaign_id)
    }
}
