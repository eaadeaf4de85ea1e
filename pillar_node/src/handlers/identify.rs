use super::{HandlerContext, IdentifyHandler};
use crate::error::HandlerResult;
use crate::types::messages::{
    IdentifyContributorsForGetAuditTrailsRequest, IdentifyContributorsForGetStatusRequest,
    IdentifyPillarsForDeleteFileRequest, IdentifyPillarsForGetChecksumsRequest,
    IdentifyPillarsForGetFileIDsRequest, IdentifyPillarsForGetFileInfosRequest,
    IdentifyPillarsForGetFileRequest, IdentifyPillarsForPutFileRequest,
    IdentifyPillarsForReplaceFileRequest,
};
use async_trait::async_trait;

pub struct IdentifyForGetFile;

#[async_trait]
impl IdentifyHandler for IdentifyForGetFile {
    type Request = IdentifyPillarsForGetFileRequest;

    async fn validate(&self, ctx: &HandlerContext, request: &Self::Request) -> HandlerResult<()> {
        ctx.validate_file_id(&request.file_id)?;
        ctx.model
            .verify_file_exists(&request.header.collection_id, &request.file_id)
            .await
    }
}

pub struct IdentifyForGetFileIds;

#[async_trait]
impl IdentifyHandler for IdentifyForGetFileIds {
    type Request = IdentifyPillarsForGetFileIDsRequest;

    async fn validate(&self, ctx: &HandlerContext, request: &Self::Request) -> HandlerResult<()> {
        ctx.verify_selection(&request.header.collection_id, &request.file_ids)
            .await
    }
}

pub struct IdentifyForGetChecksums;

#[async_trait]
impl IdentifyHandler for IdentifyForGetChecksums {
    type Request = IdentifyPillarsForGetChecksumsRequest;

    async fn validate(&self, ctx: &HandlerContext, request: &Self::Request) -> HandlerResult<()> {
        ctx.model
            .verify_checksum_spec(request.checksum_request.as_ref())?;
        ctx.verify_selection(&request.header.collection_id, &request.file_ids)
            .await
    }
}

pub struct IdentifyForGetFileInfos;

#[async_trait]
impl IdentifyHandler for IdentifyForGetFileInfos {
    type Request = IdentifyPillarsForGetFileInfosRequest;

    async fn validate(&self, ctx: &HandlerContext, request: &Self::Request) -> HandlerResult<()> {
        ctx.model
            .verify_checksum_spec(request.checksum_request.as_ref())?;
        ctx.verify_selection(&request.header.collection_id, &request.file_ids)
            .await
    }
}

pub struct IdentifyForPutFile;

#[async_trait]
impl IdentifyHandler for IdentifyForPutFile {
    type Request = IdentifyPillarsForPutFileRequest;

    async fn validate(&self, ctx: &HandlerContext, request: &Self::Request) -> HandlerResult<()> {
        ctx.validate_file_id(&request.file_id)?;
        ctx.model
            .verify_file_absent(&request.header.collection_id, &request.file_id)
            .await?;
        ctx.model.verify_enough_space_left(request.file_size).await
    }
}

pub struct IdentifyForDeleteFile;

#[async_trait]
impl IdentifyHandler for IdentifyForDeleteFile {
    type Request = IdentifyPillarsForDeleteFileRequest;

    async fn validate(&self, ctx: &HandlerContext, request: &Self::Request) -> HandlerResult<()> {
        ctx.validate_file_id(&request.file_id)?;
        ctx.model
            .verify_file_exists(&request.header.collection_id, &request.file_id)
            .await
    }
}

pub struct IdentifyForReplaceFile;

#[async_trait]
impl IdentifyHandler for IdentifyForReplaceFile {
    type Request = IdentifyPillarsForReplaceFileRequest;

    async fn validate(&self, ctx: &HandlerContext, request: &Self::Request) -> HandlerResult<()> {
        ctx.validate_file_id(&request.file_id)?;
        ctx.model
            .verify_file_exists(&request.header.collection_id, &request.file_id)
            .await?;
        ctx.model.verify_enough_space_left(request.file_size).await
    }
}

/// Every contributor answers status identification.
pub struct IdentifyForGetStatus;

#[async_trait]
impl IdentifyHandler for IdentifyForGetStatus {
    type Request = IdentifyContributorsForGetStatusRequest;

    async fn validate(&self, _ctx: &HandlerContext, _request: &Self::Request) -> HandlerResult<()> {
        Ok(())
    }
}

pub struct IdentifyForGetAuditTrails;

#[async_trait]
impl IdentifyHandler for IdentifyForGetAuditTrails {
    type Request = IdentifyContributorsForGetAuditTrailsRequest;

    async fn validate(&self, _ctx: &HandlerContext, _request: &Self::Request) -> HandlerResult<()> {
        Ok(())
    }
}
