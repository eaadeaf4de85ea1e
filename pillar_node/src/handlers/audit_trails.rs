use super::{deliver, HandlerContext, PerformHandler, Performed};
use crate::audit::{AuditQuery, FileAction};
use crate::error::HandlerResult;
use crate::types::messages::{GetAuditTrailsRequest, ResponsePayload};
use async_trait::async_trait;

/// Audit events of this pillar for the request's collection
pub struct GetAuditTrailsHandler;

#[async_trait]
impl PerformHandler for GetAuditTrailsHandler {
    type Request = GetAuditTrailsRequest;

    const ACTION: FileAction = FileAction::GetAuditTrails;

    async fn validate(&self, ctx: &HandlerContext, request: &GetAuditTrailsRequest) -> HandlerResult<()> {
        ctx.validate_pillar_id(&request.contributor)?;
        if let Some(file_id) = &request.file_id {
            ctx.validate_file_id(file_id)?;
        }
        Ok(())
    }

    async fn perform(&self, ctx: &HandlerContext, request: &GetAuditTrailsRequest) -> HandlerResult<Performed> {
        let query = AuditQuery {
            collection_id: Some(request.header.collection_id.clone()),
            file_id: request.file_id.clone(),
            min_sequence_number: request.min_sequence_number,
            max_sequence_number: request.max_sequence_number,
            min_timestamp: request.min_timestamp,
            max_timestamp: request.max_timestamp,
        };
        let events = ctx.audit.get_audits(&query).await?;
        let count = events.len();
        let delivery = deliver(ctx, events, request.result_address.as_deref()).await?;

        Ok(Performed::new(
            ResponsePayload::AuditTrails { delivery },
            format!("Delivered {} audit events", count),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::run_perform;
    use super::super::test_support::*;
    use super::*;
    use crate::audit::AuditRecord;
    use crate::types::{AlarmLevel, Delivery};

    #[tokio::test]
    async fn test_events_filtered_by_sequence_number() {
        let h = harness(AlarmLevel::Error);
        for i in 0..4 {
            h.ctx
                .audit
                .record(AuditRecord {
                    collection_id: "books".to_string(),
                    file_id: Some(format!("file{}", i)),
                    actor: "client".to_string(),
                    description: "test".to_string(),
                    audit_trail_information: None,
                    action: FileAction::PutFile,
                    correlation_id: None,
                })
                .await;
        }

        let request = GetAuditTrailsRequest {
            header: header("corr-1"),
            contributor: "pillar-1".to_string(),
            file_id: None,
            min_sequence_number: Some(3),
            max_sequence_number: None,
            min_timestamp: None,
            max_timestamp: None,
            result_address: None,
        };
        run_perform(&GetAuditTrailsHandler, &h.ctx, &request).await;

        match h.bus.final_response("corr-1").unwrap().payload {
            ResponsePayload::AuditTrails {
                delivery: Delivery::Inline { entries },
            } => {
                let numbers: Vec<u64> = entries.iter().map(|e| e.sequence_number).collect();
                assert_eq!(numbers, vec![3, 4]);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
