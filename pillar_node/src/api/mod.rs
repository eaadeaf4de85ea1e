// HTTP ingress for the pillar
//
// Requesters POST protocol messages to `/messages`. The server decodes the
// message, acknowledges receipt with 202 and hands the message to the
// mediator on a separate task; the protocol responses travel back through
// the message bus, never in the HTTP response.
//
// # Endpoints
//
// * `POST /messages`: one inbound protocol message, JSON, tagged by `type`
// * `GET /health`: liveness and identity of the pillar
//
// ```bash
// curl -X POST -H "Content-Type: application/json" \
//   -d '{"type":"IdentifyContributorsForGetStatusRequest","correlation_id":"c1",
//        "collection_id":"books","from":"client","reply_to":"http://client/replies"}' \
//   http://localhost:8080/messages
// ```

use crate::error::{PillarError, Result};
use crate::mediator::PillarMediator;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

mod handlers;

pub use handlers::*;

/// Shared state of the HTTP handlers
pub struct AppState {
    pub mediator: Arc<PillarMediator>,
    pub pillar_id: String,
}

/// API Server
pub struct ApiServer {
    app_state: Arc<AppState>,
    bind_address: String,
}

impl ApiServer {
    pub fn new(mediator: Arc<PillarMediator>, bind_address: String) -> Self {
        let pillar_id = mediator.context().pillar_id().to_string();
        Self {
            app_state: Arc::new(AppState {
                mediator,
                pillar_id,
            }),
            bind_address,
        }
    }

    /// Serves until the server fails.
    pub async fn start(&self) -> Result<()> {
        let app = self.create_router();

        let addr = self
            .bind_address
            .parse()
            .map_err(|e| PillarError::Config(format!("Invalid bind address: {}", e)))?;

        info!(
            "Pillar '{}' listening on {}",
            self.app_state.pillar_id, self.bind_address
        );

        axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .await
            .map_err(|e| PillarError::Config(format!("Server error: {}", e)))?;

        Ok(())
    }

    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health_check))
            .route("/messages", post(handlers::receive_message))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.app_state.clone())
    }
}
