//! Operator API.
//!
//! Bearer-protected endpoints to inspect the caches and breakers, drop cached
//! certificates for rotation, and re-point the forwarder.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::http::RequestForwarder;
use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub forwarder: Arc<RequestForwarder>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/certificates/reset", post(reset_certificates))
        .route("/admin/certificates/{identity}", delete(forget_certificate))
        .route("/admin/client/reset", post(reset_client))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
