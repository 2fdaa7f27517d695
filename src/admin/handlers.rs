use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::certificates::Identity;
use crate::http::ForwarderStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    #[serde(flatten)]
    pub forwarder: ForwarderStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForgetSummary {
    pub forgotten: usize,
}

/// Optional body of `POST /admin/client/reset`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClientReset {
    pub base_domain: Option<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        forwarder: state.forwarder.status(),
    })
}

pub async fn reset_certificates(State(state): State<AdminState>) -> Json<ForgetSummary> {
    let forgotten = state.forwarder.forget_all_identities();
    tracing::info!(forgotten, "Certificate caches cleared by operator");
    Json(ForgetSummary { forgotten })
}

pub async fn forget_certificate(
    State(state): State<AdminState>,
    Path(identity): Path<String>,
) -> Result<Json<ForgetSummary>, StatusCode> {
    let identity = Identity::new(&identity).ok_or(StatusCode::BAD_REQUEST)?;
    if state.forwarder.forget_identity(&identity) {
        tracing::info!(identity = %identity, "Certificate forgotten by operator");
        Ok(Json(ForgetSummary { forgotten: 1 }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

pub async fn reset_client(
    State(state): State<AdminState>,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, String)> {
    let request: ClientReset = if body.iter().all(u8::is_ascii_whitespace) {
        ClientReset::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    };

    if let Some(domain) = request.base_domain.filter(|d| !d.trim().is_empty()) {
        state.forwarder.set_base_domain(domain);
    }
    state.forwarder.reset();
    Ok(StatusCode::NO_CONTENT)
}
