use super::{HandlerContext, PerformHandler, Performed};
use crate::audit::FileAction;
use crate::error::{HandlerResult, RequestHandlerError};
use crate::types::messages::{GetFileRequest, MessageResponse, ResponsePayload};
use async_trait::async_trait;
use tracing::info;

/// Uploads a file, or a part of it, to the client's address.
pub struct GetFileHandler;

#[async_trait]
impl PerformHandler for GetFileHandler {
    type Request = GetFileRequest;

    const ACTION: FileAction = FileAction::GetFile;

    async fn validate(&self, ctx: &HandlerContext, request: &GetFileRequest) -> HandlerResult<()> {
        ctx.validate_pillar_id(&request.pillar_id)?;
        ctx.validate_file_id(&request.file_id)?;
        ctx.model
            .verify_checksum_spec(request.checksum_request.as_ref())?;
        ctx.model
            .verify_file_exists(&request.header.collection_id, &request.file_id)
            .await
    }

    /// The requested checksum travels with the progress response.
    async fn progress(&self, ctx: &HandlerContext, request: &GetFileRequest) -> HandlerResult<MessageResponse> {
        let Some(spec) = &request.checksum_request else {
            return Ok(ctx.responses.build_progress(request));
        };
        let checksum_data = ctx
            .model
            .checksum_of(&request.header.collection_id, &request.file_id, spec)
            .await?;
        Ok(ctx.responses.build_progress_with(
            request,
            ResponsePayload::Checksum {
                checksum_data: Some(checksum_data),
            },
        ))
    }

    async fn perform(&self, ctx: &HandlerContext, request: &GetFileRequest) -> HandlerResult<Performed> {
        let content = ctx
            .model
            .read_file(&request.header.collection_id, &request.file_id, request.file_part)
            .await?;
        let size = content.len();

        ctx.exchange
            .upload(content, &request.file_address)
            .await
            .map_err(RequestHandlerError::from_transfer)?;
        info!(
            "Delivered {} bytes of '{}' to {}",
            size, request.file_id, request.file_address
        );

        Ok(Performed::new(
            ResponsePayload::FileDelivery {
                file_address: request.file_address.clone(),
                file_part: request.file_part,
                checksum_data: None,
            },
            format!("Delivered {} bytes", size),
        ))
    }
}
