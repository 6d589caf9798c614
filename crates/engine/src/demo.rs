//! Demo data seeding for development and manual testing.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use drip_core::campaign::{Campaign, CampaignKind, CampaignStatus, SequenceStep};

use crate::runner::CampaignRunner;
use crate::store::{CampaignStore, StepStore};

/// Seed two demo tenants with one active sequence each.
pub fn seed_demo(campaigns: &Arc<CampaignStore>, steps: &Arc<StepStore>, runner: &CampaignRunner) {
    info!("Seeding demo campaigns");
    let now = Utc::now();

    // ---- Tenant 1: three-step welcome series ----
    let tenant_a = Uuid::new_v4();
    let welcome = Campaign {
        id: Uuid::new_v4(),
        tenant_id: tenant_a,
        name: "Welcome Series".into(),
        kind: CampaignKind::Sequence,
        status: CampaignStatus::Active,
        stats: Default::default(),
        created_at: now,
        updated_at: now,
    };
    let welcome_steps = vec![
        step(welcome.id, 0, 0, "Welcome aboard", "Thanks for signing up."),
        step(welcome.id, 1, 86_400, "Getting started tips", "Three things to try today."),
        step(welcome.id, 2, 259_200, "How is it going?", "Reply and tell us what you think."),
    ];
    campaigns.insert(welcome.clone());
    steps.put_steps(tenant_a, welcome.id, welcome_steps);
    for email in ["ada@example.com", "grace@example.com"] {
        let _ = runner.enroll(welcome.id, tenant_a, email);
    }

    // ---- Tenant 2: two-step win-back sequence ----
    let tenant_b = Uuid::new_v4();
    let winback = Campaign {
        id: Uuid::new_v4(),
        tenant_id: tenant_b,
        name: "Win-back".into(),
        kind: CampaignKind::Sequence,
        status: CampaignStatus::Active,
        stats: Default::default(),
        created_at: now,
        updated_at: now,
    };
    let winback_steps = vec![
        step(winback.id, 0, 0, "We miss you", "It has been a while."),
        step(winback.id, 1, 172_800, "One last nudge", "Here is what changed since you left."),
    ];
    campaigns.insert(winback.clone());
    steps.put_steps(tenant_b, winback.id, winback_steps);
    let _ = runner.enroll(winback.id, tenant_b, "lin@example.com");

    info!("Seeded 2 demo campaigns across 2 tenants");
}

fn step(campaign_id: Uuid, index: u32, delay_secs: u64, subject: &str, body: &str) -> SequenceStep {
    SequenceStep {
        campaign_id,
        index,
        delay_secs,
        subject: subject.into(),
        body_text: body.into(),
        body_html: format!("<p>{body}</p>"),
    }
}
