//! Trigger dispatcher — fan-out over every tenant's active campaigns.
//!
//! Invoked by an external recurring caller with no coordination guarantee;
//! two overlapping passes are tolerated by the per-membership claim in the
//! runner, not prevented here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use drip_core::campaign::RunResult;

use crate::runner::{CampaignRunner, RunOptions};
use crate::store::CampaignStore;

/// Identifies the campaign a detail row belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRef {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
}

/// One campaign's outcome within a trigger pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRunDetail {
    pub campaign: CampaignRef,
    pub result: RunResult,
}

/// Summary of a full trigger pass, returned to the external caller so
/// operators can spot silently-stuck campaigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSummary {
    pub campaigns_processed: usize,
    pub details: Vec<CampaignRunDetail>,
}

/// Enumerates active campaigns and runs each once per invocation.
pub struct TriggerDispatcher {
    campaigns: Arc<CampaignStore>,
    runner: Arc<CampaignRunner>,
    pass_deadline: Duration,
}

impl TriggerDispatcher {
    pub fn new(
        campaigns: Arc<CampaignStore>,
        runner: Arc<CampaignRunner>,
        pass_deadline: Duration,
    ) -> Self {
        Self {
            campaigns,
            runner,
            pass_deadline,
        }
    }

    /// One full pass: run every active campaign concurrently (different
    /// campaigns never share membership rows) and collect the results. A
    /// campaign-level failure lands in that campaign's detail row without
    /// aborting the others.
    pub async fn run_all(&self) -> TriggerSummary {
        let active = self.campaigns.list_active();
        let deadline = Instant::now() + self.pass_deadline;

        let mut tasks: JoinSet<CampaignRunDetail> = JoinSet::new();
        for campaign in active {
            let runner = self.runner.clone();
            tasks.spawn(async move {
                let result = runner
                    .run(
                        campaign.id,
                        campaign.tenant_id,
                        RunOptions {
                            force: false,
                            deadline: Some(deadline),
                        },
                    )
                    .await;
                CampaignRunDetail {
                    campaign: CampaignRef {
                        id: campaign.id,
                        tenant_id: campaign.tenant_id,
                        name: campaign.name,
                    },
                    result,
                }
            });
        }

        let mut details = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(detail) => details.push(detail),
                Err(e) => error!(error = %e, "Campaign run task failed"),
            }
        }

        let summary = TriggerSummary {
            campaigns_processed: details.len(),
            details,
        };
        info!(
            campaigns = summary.campaigns_processed,
            "Trigger pass finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use drip_core::campaign::{
        Campaign, CampaignKind, CampaignStatus, SequenceStep,
    };
    use drip_core::config::EngineConfig;
    use drip_core::dispatch::capture_dispatcher;

    use crate::log::ExecutionLog;
    use crate::store::{MembershipStore, StepStore};

    fn make_campaign(tenant_id: Uuid, name: &str, status: CampaignStatus) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            kind: CampaignKind::Sequence,
            status,
            stats: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn one_step(campaign_id: Uuid) -> Vec<SequenceStep> {
        vec![SequenceStep {
            campaign_id,
            index: 0,
            delay_secs: 0,
            subject: "Hello".into(),
            body_text: "hi".into(),
            body_html: "<p>hi</p>".into(),
        }]
    }

    #[tokio::test]
    async fn test_fan_out_covers_all_tenants_active_campaigns() {
        let campaigns = Arc::new(CampaignStore::new());
        let steps = Arc::new(StepStore::new());
        let memberships = Arc::new(MembershipStore::new());
        let log = Arc::new(ExecutionLog::new());
        let dispatcher = capture_dispatcher();

        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let active_a = make_campaign(tenant_a, "A Welcome", CampaignStatus::Active);
        let active_b = make_campaign(tenant_b, "B Winback", CampaignStatus::Active);
        let paused = make_campaign(tenant_a, "A Paused", CampaignStatus::Paused);
        for c in [&active_a, &active_b, &paused] {
            campaigns.insert(c.clone());
            steps.put_steps(c.tenant_id, c.id, one_step(c.id));
        }
        memberships
            .enroll(tenant_a, active_a.id, "a@example.com", None)
            .unwrap();
        memberships
            .enroll(tenant_b, active_b.id, "b@example.com", None)
            .unwrap();
        memberships
            .enroll(tenant_a, paused.id, "p@example.com", None)
            .unwrap();

        let runner = Arc::new(CampaignRunner::new(
            campaigns.clone(),
            steps,
            memberships,
            log,
            dispatcher.clone(),
            EngineConfig::default(),
        ));
        let trigger = TriggerDispatcher::new(campaigns, runner, Duration::from_secs(60));

        let summary = trigger.run_all().await;

        // Paused campaigns are not enumerated at all.
        assert_eq!(summary.campaigns_processed, 2);
        let total_sent: u64 = summary.details.iter().map(|d| d.result.sent).sum();
        assert_eq!(total_sent, 2);
        assert_eq!(dispatcher.sent_to("a@example.com"), 1);
        assert_eq!(dispatcher.sent_to("b@example.com"), 1);
        assert_eq!(dispatcher.sent_to("p@example.com"), 0);
    }

    #[tokio::test]
    async fn test_summary_serializes_for_the_trigger_response() {
        let campaigns = Arc::new(CampaignStore::new());
        let runner = Arc::new(CampaignRunner::new(
            campaigns.clone(),
            Arc::new(StepStore::new()),
            Arc::new(MembershipStore::new()),
            Arc::new(ExecutionLog::new()),
            capture_dispatcher(),
            EngineConfig::default(),
        ));
        let trigger = TriggerDispatcher::new(campaigns, runner, Duration::from_secs(60));

        let summary = trigger.run_all().await;
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["campaignsProcessed"], 0);
        assert!(json["details"].as_array().unwrap().is_empty());
    }
}
