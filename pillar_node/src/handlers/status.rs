use super::{HandlerContext, PerformHandler, Performed};
use crate::audit::FileAction;
use crate::error::HandlerResult;
use crate::types::messages::{GetStatusRequest, ResponsePayload};
use crate::types::{ResultingStatus, StatusCode};
use async_trait::async_trait;
use chrono::Utc;

pub struct GetStatusHandler;

#[async_trait]
impl PerformHandler for GetStatusHandler {
    type Request = GetStatusRequest;

    const ACTION: FileAction = FileAction::GetStatus;

    async fn validate(&self, ctx: &HandlerContext, request: &GetStatusRequest) -> HandlerResult<()> {
        ctx.validate_pillar_id(&request.contributor)
    }

    async fn perform(&self, ctx: &HandlerContext, _request: &GetStatusRequest) -> HandlerResult<Performed> {
        let status = ResultingStatus {
            status_code: StatusCode::Ok,
            status_text: format!("Pillar '{}' is running", ctx.pillar_id()),
            status_timestamp: Utc::now(),
        };
        Ok(Performed::new(
            ResponsePayload::Status { status },
            "Reported status",
        ))
    }
}
