use super::{deliver, window, HandlerContext, PerformHandler, Performed};
use crate::audit::FileAction;
use crate::error::HandlerResult;
use crate::types::messages::{GetFileIDsRequest, ResponsePayload};
use async_trait::async_trait;

pub struct GetFileIdsHandler;

#[async_trait]
impl PerformHandler for GetFileIdsHandler {
    type Request = GetFileIDsRequest;

    const ACTION: FileAction = FileAction::GetFileIds;

    async fn validate(&self, ctx: &HandlerContext, request: &GetFileIDsRequest) -> HandlerResult<()> {
        ctx.validate_pillar_id(&request.pillar_id)?;
        ctx.verify_selection(&request.header.collection_id, &request.file_ids)
            .await
    }

    async fn perform(&self, ctx: &HandlerContext, request: &GetFileIDsRequest) -> HandlerResult<Performed> {
        let results = ctx
            .model
            .file_id_results(
                &request.header.collection_id,
                &request.file_ids,
                &window(
                    request.min_timestamp,
                    request.max_timestamp,
                    request.max_number_of_results,
                ),
            )
            .await?;

        let count = results.entries.len();
        let partial_result = results.partial_result;
        let delivery = deliver(ctx, results.entries, request.result_address.as_deref()).await?;

        Ok(Performed::new(
            ResponsePayload::FileIds {
                delivery,
                partial_result,
            },
            format!("Delivered {} file ids", count),
        ))
    }
}
