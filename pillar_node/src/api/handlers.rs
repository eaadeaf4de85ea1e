// API route handlers

use crate::api::AppState;
use crate::error::{PillarError, Result};
use crate::types::messages::Message;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ctx = state.mediator.context();
    Json(serde_json::json!({
        "status": "healthy",
        "pillar_id": state.pillar_id,
        "checksum_pillar": ctx.model.is_checksum_pillar(),
        "collections": ctx.config.pillar.collection_ids,
    }))
}

/// Accepts one protocol message. Only input without a readable `type` is
/// rejected here; everything else, malformed bodies included, is handed to
/// the mediator and answered on the bus.
pub async fn receive_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse> {
    let message = Message::decode(body)
        .map_err(|e| PillarError::Serialization(format!("Undecodable message: {}", e)))?;

    let tracking_id = message
        .header()
        .map(|h| h.correlation_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!("Received {} [{}]", message.type_name(), tracking_id);

    let mediator = state.mediator.clone();
    tokio::spawn(async move {
        mediator.dispatch(message).await;
        debug!("Finished handling [{}]", tracking_id);
    });

    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use crate::mediator::PillarMediator;
    use crate::bus::LocalMessageBus;
    use crate::audit::AuditQuery;
    use crate::types::{AlarmLevel, ResponseCode};
    use std::time::Duration;

    fn state_at(level: AlarmLevel) -> (Arc<AppState>, Arc<LocalMessageBus>) {
        let Harness { ctx, bus, .. } = harness(level);
        let state = Arc::new(AppState {
            mediator: Arc::new(PillarMediator::new(Arc::new(ctx))),
            pillar_id: "pillar-1".to_string(),
        });
        (state, bus)
    }

    fn state() -> (Arc<AppState>, Arc<LocalMessageBus>) {
        state_at(AlarmLevel::Error)
    }

    async fn wait_for_final(bus: &LocalMessageBus, correlation_id: &str) {
        for _ in 0..50 {
            if bus.final_response(correlation_id).is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_undecodable_message_rejected() {
        let (state, _bus) = state();
        let body = serde_json::json!({"correlation_id": "corr-0", "file_id": "file1"});

        let result = receive_message(State(state), Json(body)).await;
        assert!(matches!(result, Err(PillarError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_message_accepted_and_dispatched() {
        let (state, bus) = state();
        let body = serde_json::json!({
            "type": "IdentifyContributorsForGetStatusRequest",
            "correlation_id": "corr-1",
            "collection_id": "books",
            "from": "client",
            "reply_to": "http://client/replies",
        });

        let response = receive_message(State(state), Json(body))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        for _ in 0..50 {
            if !bus.responses_for("corr-1").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bus.responses_for("corr-1").len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_reaches_the_mediator() {
        let (state, bus) = state_at(AlarmLevel::Warning);
        let body = serde_json::json!({
            "type": "DeleteFileRequest",
            "correlation_id": "corr-2",
            "collection_id": "books",
            "from": "client",
            "reply_to": "http://client/replies",
            "pillar_id": "pillar-1",
            "file_id": null,
        });

        let response = receive_message(State(state.clone()), Json(body))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        wait_for_final(&bus, "corr-2").await;
        let final_response = bus.final_response("corr-2").unwrap();
        assert_eq!(
            final_response.response_info.response_code,
            ResponseCode::RequestNotUnderstoodFailure
        );

        let audit = &state.mediator.context().audit;
        let mut audits = Vec::new();
        for _ in 0..50 {
            audits = audit.get_audits(&AuditQuery::default()).await.unwrap();
            if !audits.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(audits.len(), 1);
    }
}
