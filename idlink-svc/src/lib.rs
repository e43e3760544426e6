//! idlink-svc library - contact identity reconciliation service
//!
//! Links contact records that share an email or phone number into
//! primary/secondary clusters and serves the consolidated view over HTTP.

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod reconcile;
pub mod store;

pub use reconcile::{ConsolidatedView, IdentifyRequest, Reconciler};
pub use store::ContactStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::post;

    Router::new()
        .route("/identify", post(api::identify))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
