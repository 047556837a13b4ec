//! Router assembly.
//!
//! Binds the WebSocket relay and the REST/export endpoints under a single
//! Axum router with CORS open to the browser clients.

pub mod records;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/schools/{code}/records",
            get(records::list_records).delete(records::clear_records),
        )
        .route(
            "/api/schools/{code}/records/{id}",
            axum::routing::delete(records::delete_record),
        )
        .route("/api/schools/{code}/export.csv", get(records::export_csv))
        .route("/api/schools/{code}/export.txt", get(records::export_text))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
