use super::{HandlerContext, PerformHandler, Performed};
use crate::audit::FileAction;
use crate::error::{HandlerResult, RequestHandlerError};
use crate::types::messages::{PutFileRequest, ResponsePayload};
use crate::types::ResponseCode;
use async_trait::async_trait;
use tracing::info;

/// Stores a new file downloaded from the client's address.
pub struct PutFileHandler;

#[async_trait]
impl PerformHandler for PutFileHandler {
    type Request = PutFileRequest;

    const ACTION: FileAction = FileAction::PutFile;
    const LOCKS_FILE: bool = true;

    async fn validate(&self, ctx: &HandlerContext, request: &PutFileRequest) -> HandlerResult<()> {
        ctx.validate_pillar_id(&request.pillar_id)?;
        ctx.validate_file_id(&request.file_id)?;

        if ctx.config.checksum.require_checksum_for_new_file
            && request.checksum_data_for_new_file.is_none()
        {
            return Err(RequestHandlerError::illegal_operation(
                ResponseCode::NewFileChecksumFailure,
                "A checksum for the new file is required by this pillar",
                request.file_id.clone(),
            ));
        }
        ctx.model.validator().verify_algorithm_supported(
            request
                .checksum_data_for_new_file
                .as_ref()
                .map(|data| &data.checksum_spec),
            false,
        )?;
        ctx.model
            .verify_checksum_spec(request.checksum_request_for_new_file.as_ref())?;

        let collection_id = &request.header.collection_id;
        ctx.model.verify_file_absent(collection_id, &request.file_id).await?;
        ctx.model.verify_enough_space_left(request.file_size).await
    }

    async fn perform(&self, ctx: &HandlerContext, request: &PutFileRequest) -> HandlerResult<Performed> {
        let collection_id = &request.header.collection_id;

        let content = ctx
            .exchange
            .download(&request.file_address)
            .await
            .map_err(RequestHandlerError::from_transfer)?;
        let size = content.len();

        ctx.model
            .store_new_file(
                collection_id,
                &request.file_id,
                content,
                request.checksum_data_for_new_file.as_ref(),
            )
            .await?;
        info!(
            "Stored '{}' ({} bytes) in collection '{}'",
            request.file_id, size, collection_id
        );

        let checksum_data = match &request.checksum_request_for_new_file {
            Some(spec) => Some(
                ctx.model
                    .checksum_of(collection_id, &request.file_id, spec)
                    .await?,
            ),
            None => None,
        };

        Ok(Performed::new(
            ResponsePayload::Checksum { checksum_data },
            format!("Stored file of {} bytes", size),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::run_perform;
    use super::super::test_support::*;
    use super::*;
    use crate::types::messages::ResponseStage;
    use crate::types::{AlarmLevel, ChecksumData, ChecksumSpec, ChecksumType};
    use crate::storage::FileArchive;
    use chrono::Utc;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn request(correlation_id: &str) -> PutFileRequest {
        PutFileRequest {
            header: header(correlation_id),
            pillar_id: "pillar-1".to_string(),
            file_id: "file1".to_string(),
            file_address: "mem://upload/file1".to_string(),
            file_size: Some(0),
            checksum_data_for_new_file: None,
            checksum_request_for_new_file: None,
        }
    }

    #[tokio::test]
    async fn test_put_with_requested_checksum() {
        let h = harness(AlarmLevel::Error);
        h.exchange.insert("mem://upload/file1", "");

        let mut request = request("corr-1");
        request.checksum_data_for_new_file = Some(ChecksumData {
            checksum_spec: ChecksumSpec::new(ChecksumType::Md5),
            checksum_value: EMPTY_MD5.to_uppercase(),
            calculation_timestamp: Utc::now(),
        });
        request.checksum_request_for_new_file = Some(ChecksumSpec::new(ChecksumType::Md5));

        let outcome = run_perform(&PutFileHandler, &h.ctx, &request).await;
        assert_eq!(outcome.action, FileAction::PutFile);

        let responses = h.bus.responses_for("corr-1");
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].stage, ResponseStage::Progress);
        assert_eq!(responses[1].stage, ResponseStage::Final);
        match &responses[1].payload {
            ResponsePayload::Checksum {
                checksum_data: Some(data),
            } => assert_eq!(data.checksum_value, EMPTY_MD5),
            other => panic!("unexpected payload: {:?}", other),
        }
        assert!(h.archive.has_file("books", "file1").await.unwrap());
        assert!(h.ctx.locks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_mandatory_checksum_is_refused_before_transfer() {
        let mut h = harness(AlarmLevel::Error);
        let mut config = (*h.ctx.config).clone();
        config.checksum.require_checksum_for_new_file = true;
        h.ctx.config = std::sync::Arc::new(config);

        run_perform(&PutFileHandler, &h.ctx, &request("corr-2")).await;

        let responses = h.bus.responses_for("corr-2");
        assert_eq!(responses.len(), 1);
        assert_eq!(
            responses[0].response_info.response_code,
            ResponseCode::NewFileChecksumFailure
        );
        assert_eq!(h.alarms.count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_address_is_a_transfer_failure() {
        let h = harness(AlarmLevel::Error);
        h.exchange.set_unreachable(true);

        let outcome = run_perform(&PutFileHandler, &h.ctx, &request("corr-3")).await;
        assert_eq!(outcome.action, FileAction::Failure);

        let final_response = h.bus.final_response("corr-3").unwrap();
        assert_eq!(
            final_response.response_info.response_code,
            ResponseCode::FileTransferFailure
        );
        assert_eq!(h.alarms.count(), 0);
        assert!(!h.archive.has_file("books", "file1").await.unwrap());
    }
}
