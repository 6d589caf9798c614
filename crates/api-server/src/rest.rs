//! REST handlers for the trigger entry point and administrative runs.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

use drip_core::campaign::RunResult;
use drip_engine::runner::RunOptions;
use drip_engine::trigger::TriggerSummary;
use drip_engine::{CampaignRunner, TriggerDispatcher};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub trigger: Arc<TriggerDispatcher>,
    pub runner: Arc<CampaignRunner>,
    pub trigger_secret: String,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Debug, Deserialize)]
pub struct TriggerParams {
    pub secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub reset: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

/// The authenticated tenant id, forwarded by the auth layer in front of us.
fn tenant_from_headers(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "missing_tenant",
                "x-tenant-id header must carry the authenticated tenant id",
            )
        })
}

/// GET /internal/cron/run — the periodic trigger entry point. Runs every
/// tenant's active campaigns and returns the per-campaign summary.
pub async fn run_trigger(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
) -> Result<Json<TriggerSummary>, ApiError> {
    if params.secret.as_deref() != Some(state.trigger_secret.as_str()) {
        warn!("Trigger invoked with a bad or missing secret");
        metrics::counter!("api.trigger_auth_failures").increment(1);
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "invalid trigger secret",
        ));
    }
    Ok(Json(state.trigger.run_all().await))
}

/// POST /v1/campaigns/{id}/run — manually run a single campaign for the
/// authenticated tenant, optionally forcing past the due-time gate.
pub async fn run_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    headers: HeaderMap,
    body: Option<Json<RunRequest>>,
) -> Result<Json<RunResult>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    let force = body.map(|Json(r)| r.force).unwrap_or(false);

    let result = state
        .runner
        .run(campaign_id, tenant_id, RunOptions { force, deadline: None })
        .await;

    match &result.error {
        None => Ok(Json(result)),
        Some(message) if message.contains("not found") => Err(api_error(
            StatusCode::NOT_FOUND,
            "campaign_not_found",
            message.clone(),
        )),
        Some(message) => Err(api_error(
            StatusCode::CONFLICT,
            "campaign_not_runnable",
            message.clone(),
        )),
    }
}

/// POST /v1/campaigns/{id}/reset — administrative bulk reset of every
/// membership of the campaign back to step 0.
pub async fn reset_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ResetResponse>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    match state.runner.reset(campaign_id, tenant_id) {
        Ok(reset) => Ok(Json(ResetResponse { reset })),
        Err(e) => Err(api_error(
            StatusCode::NOT_FOUND,
            "campaign_not_found",
            e.to_string(),
        )),
    }
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    use drip_core::campaign::{Campaign, CampaignKind, CampaignStatus, SequenceStep};
    use drip_core::config::EngineConfig;
    use drip_core::dispatch::capture_dispatcher;
    use drip_engine::{CampaignStore, ExecutionLog, MembershipStore, StepStore};

    fn make_state() -> (AppState, Uuid, Uuid) {
        let campaigns = Arc::new(CampaignStore::new());
        let steps = Arc::new(StepStore::new());
        let memberships = Arc::new(MembershipStore::new());
        let log = Arc::new(ExecutionLog::new());

        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4(),
            tenant_id,
            name: "Welcome".into(),
            kind: CampaignKind::Sequence,
            status: CampaignStatus::Active,
            stats: Default::default(),
            created_at: now,
            updated_at: now,
        };
        let campaign_id = campaign.id;
        campaigns.insert(campaign);
        steps.put_steps(
            tenant_id,
            campaign_id,
            vec![SequenceStep {
                campaign_id,
                index: 0,
                delay_secs: 0,
                subject: "Hi".into(),
                body_text: "hi".into(),
                body_html: "<p>hi</p>".into(),
            }],
        );

        let runner = Arc::new(CampaignRunner::new(
            campaigns.clone(),
            steps,
            memberships,
            log,
            capture_dispatcher(),
            EngineConfig::default(),
        ));
        runner.enroll(campaign_id, tenant_id, "lead@example.com").unwrap();

        let trigger = Arc::new(TriggerDispatcher::new(
            campaigns,
            runner.clone(),
            Duration::from_secs(60),
        ));

        let state = AppState {
            trigger,
            runner,
            trigger_secret: "s3cret".into(),
            node_id: "node-test".into(),
            start_time: Instant::now(),
        };
        (state, campaign_id, tenant_id)
    }

    fn tenant_headers(tenant_id: Uuid) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-id", tenant_id.to_string().parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_trigger_rejects_bad_secret() {
        let (state, _, _) = make_state();

        let err = run_trigger(
            State(state.clone()),
            Query(TriggerParams {
                secret: Some("wrong".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        let err = run_trigger(State(state), Query(TriggerParams { secret: None }))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_trigger_runs_active_campaigns() {
        let (state, _, _) = make_state();

        let Json(summary) = run_trigger(
            State(state),
            Query(TriggerParams {
                secret: Some("s3cret".into()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(summary.campaigns_processed, 1);
        assert_eq!(summary.details[0].result.sent, 1);
    }

    #[tokio::test]
    async fn test_manual_run_requires_tenant_header() {
        let (state, campaign_id, _) = make_state();

        let err = run_campaign(
            State(state),
            Path(campaign_id),
            HeaderMap::new(),
            Some(Json(RunRequest::default())),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_manual_run_is_tenant_scoped() {
        let (state, campaign_id, tenant_id) = make_state();

        // Right tenant: sends.
        let Json(result) = run_campaign(
            State(state.clone()),
            Path(campaign_id),
            tenant_headers(tenant_id),
            Some(Json(RunRequest::default())),
        )
        .await
        .unwrap();
        assert_eq!(result.sent, 1);

        // Another tenant's id never reaches this campaign.
        let err = run_campaign(
            State(state),
            Path(campaign_id),
            tenant_headers(Uuid::new_v4()),
            Some(Json(RunRequest::default())),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_endpoint() {
        let (state, campaign_id, tenant_id) = make_state();

        let Json(resp) = reset_campaign(
            State(state.clone()),
            Path(campaign_id),
            tenant_headers(tenant_id),
        )
        .await
        .unwrap();
        assert_eq!(resp.reset, 1);

        let err = reset_campaign(
            State(state),
            Path(campaign_id),
            tenant_headers(Uuid::new_v4()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
