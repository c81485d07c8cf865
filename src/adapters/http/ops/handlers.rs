//! Ops endpoints: service info, liveness, readiness and sync control.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::adapters::http::error::ApiError;
use crate::adapters::http::state::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub environment: &'static str,
    pub ready: bool,
    pub endpoints: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Check {
    fn passed() -> Self {
        Self { ok: true, error: None }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnvCheck {
    pub ok: bool,
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ReadyChecks {
    pub payments: Check,
    pub profiles: Check,
    pub env: EnvCheck,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ok: bool,
    pub checks: ReadyChecks,
}

const ENDPOINTS: &[&str] = &[
    "GET /api/health",
    "GET /api/ready",
    "GET|POST /api/sync-status",
    "POST /api/stripe/webhook",
    "POST /api/stripe/create-customer",
    "POST /api/stripe/create-checkout",
    "POST /api/stripe/create-paymentsheet",
    "POST /api/stripe/confirm-paymentsheet",
    "GET /api/stripe/verify-session",
    "POST /api/stripe/cancel-subscription",
    "POST /api/stripe/reactivate-subscription",
    "POST /api/stripe/get-billing-history",
    "POST /api/stripe/sync-plan",
    "POST /api/stripe/create-coupon",
    "POST /api/stripe/create-promotion-code",
    "POST /api/stripe/create-discounted-price",
    "GET|POST /api/stripe/validate-coupon",
];

/// GET /
pub async fn service_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.environment(),
        ready: state.is_ready(),
        endpoints: ENDPOINTS,
    })
}

/// GET /api/health
pub async fn health() -> impl IntoResponse {
    Json(OkResponse { ok: true })
}

/// GET /api/ready
///
/// Probes Payments and the Profile Store concurrently. Any failed check, or
/// a missing required variable, answers 503.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let (payments, profiles) = match state.services() {
        Ok(services) => {
            let ports = services.ports();
            let (payments, profiles) = tokio::join!(ports.payments.ping(), ports.profiles.ping());
            (
                payments.map_or_else(|e| Check::failed(e.to_string()), |_| Check::passed()),
                profiles.map_or_else(|e| Check::failed(e.to_string()), |_| Check::passed()),
            )
        }
        Err(e) => (Check::failed(e.to_string()), Check::failed(e.to_string())),
    };
    let missing = state.missing_env().to_vec();
    let env = EnvCheck {
        ok: missing.is_empty(),
        missing,
    };

    let ok = payments.ok && profiles.ok && env.ok;
    if !ok {
        tracing::warn!(
            payments = payments.ok,
            profiles = profiles.ok,
            env = env.ok,
            "Readiness check failed"
        );
    }
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ok,
            checks: ReadyChecks {
                payments,
                profiles,
                env,
            },
        }),
    )
}

/// GET /api/sync-status
pub async fn sync_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let services = state.services()?;
    Ok(Json(services.sync().status()))
}

/// POST /api/sync-status
///
/// Schedules a run and answers 202 without waiting for it.
pub async fn trigger_sync(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let services = state.services()?;
    services.sync().trigger();
    tracing::info!("Manual sync scheduled");
    Ok((StatusCode::ACCEPTED, Json(OkResponse { ok: true })))
}
