use super::delete_file::verify_existing_file;
use super::{HandlerContext, PerformHandler, Performed};
use crate::audit::FileAction;
use crate::error::{HandlerResult, RequestHandlerError};
use crate::types::messages::{ReplaceFileRequest, ResponsePayload};
use crate::types::ResponseCode;
use async_trait::async_trait;
use tracing::info;

/// Swaps an existing file for new content; the old content is retained.
pub struct ReplaceFileHandler;

#[async_trait]
impl PerformHandler for ReplaceFileHandler {
    type Request = ReplaceFileRequest;

    const ACTION: FileAction = FileAction::ReplaceFile;
    const LOCKS_FILE: bool = true;

    async fn validate(&self, ctx: &HandlerContext, request: &ReplaceFileRequest) -> HandlerResult<()> {
        ctx.validate_pillar_id(&request.pillar_id)?;
        ctx.validate_file_id(&request.file_id)?;

        let collection_id = &request.header.collection_id;
        ctx.model
            .verify_file_exists(collection_id, &request.file_id)
            .await?;
        ctx.model.verify_enough_space_left(request.file_size).await?;

        ctx.model
            .verify_checksum_spec(request.checksum_request_for_existing_file.as_ref())?;
        ctx.model
            .verify_checksum_spec(request.checksum_request_for_new_file.as_ref())?;
        ctx.model.validator().verify_algorithm_supported(
            request
                .checksum_data_for_new_file
                .as_ref()
                .map(|data| &data.checksum_spec),
            false,
        )?;

        if ctx.config.checksum.require_checksum_for_new_file
            && request.checksum_data_for_new_file.is_none()
        {
            return Err(RequestHandlerError::illegal_operation(
                ResponseCode::NewFileChecksumFailure,
                "A checksum for the new file is required by this pillar",
                request.file_id.clone(),
            ));
        }

        verify_existing_file(
            ctx,
            collection_id,
            &request.file_id,
            request.checksum_data_for_existing_file.as_ref(),
        )
        .await
    }

    async fn perform(&self, ctx: &HandlerContext, request: &ReplaceFileRequest) -> HandlerResult<Performed> {
        let collection_id = &request.header.collection_id;

        let checksum_for_existing_file = match &request.checksum_request_for_existing_file {
            Some(spec) => Some(
                ctx.model
                    .compute_checksum(collection_id, &request.file_id, spec)
                    .await?,
            ),
            None => None,
        };

        let content = ctx
            .exchange
            .download(&request.file_address)
            .await
            .map_err(RequestHandlerError::from_transfer)?;
        let size = content.len();

        ctx.model
            .replace_file(
                collection_id,
                &request.file_id,
                content,
                request.checksum_data_for_new_file.as_ref(),
            )
            .await?;
        info!(
            "Replaced '{}' in collection '{}' with {} bytes",
            request.file_id, collection_id, size
        );

        let checksum_for_new_file = match &request.checksum_request_for_new_file {
            Some(spec) => Some(
                ctx.model
                    .checksum_of(collection_id, &request.file_id, spec)
                    .await?,
            ),
            None => None,
        };

        Ok(Performed::new(
            ResponsePayload::Replace {
                checksum_for_existing_file,
                checksum_for_new_file,
            },
            format!("Replaced file with {} bytes", size),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::run_perform;
    use super::super::test_support::*;
    use super::*;
    use crate::types::{AlarmLevel, ChecksumData, ChecksumSpec, ChecksumType};
    use chrono::Utc;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const DATA_MD5: &str = "8d777f385d3dfec8815d20f7496026dc";

    fn md5(value: &str) -> ChecksumData {
        ChecksumData {
            checksum_spec: ChecksumSpec::new(ChecksumType::Md5),
            checksum_value: value.to_string(),
            calculation_timestamp: Utc::now(),
        }
    }

    fn request(correlation_id: &str) -> ReplaceFileRequest {
        ReplaceFileRequest {
            header: header(correlation_id),
            pillar_id: "pillar-1".to_string(),
            file_id: "file1".to_string(),
            file_address: "mem://upload/file1".to_string(),
            file_size: Some(4),
            checksum_data_for_existing_file: Some(md5(EMPTY_MD5)),
            checksum_request_for_existing_file: Some(ChecksumSpec::new(ChecksumType::Md5)),
            checksum_data_for_new_file: Some(md5(DATA_MD5)),
            checksum_request_for_new_file: Some(ChecksumSpec::new(ChecksumType::Md5)),
        }
    }

    #[tokio::test]
    async fn test_replace_reports_both_checksums() {
        let h = harness(AlarmLevel::Error);
        h.archive.insert("books", "file1", "");
        h.exchange.insert("mem://upload/file1", "data");

        let outcome = run_perform(&ReplaceFileHandler, &h.ctx, &request("corr-1")).await;
        assert_eq!(outcome.action, FileAction::ReplaceFile);

        match h.bus.final_response("corr-1").unwrap().payload {
            ResponsePayload::Replace {
                checksum_for_existing_file: Some(old),
                checksum_for_new_file: Some(new),
            } => {
                assert_eq!(old.checksum_value, EMPTY_MD5);
                assert_eq!(new.checksum_value, DATA_MD5);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(h.archive.content("books", "file1").unwrap(), "data");
        assert_eq!(h.archive.retained("books", "file1"), vec![bytes::Bytes::new()]);
    }

    #[tokio::test]
    async fn test_bad_new_checksum_keeps_old_content() {
        let h = harness(AlarmLevel::Error);
        h.archive.insert("books", "file1", "");
        h.exchange.insert("mem://upload/file1", "other data");

        run_perform(&ReplaceFileHandler, &h.ctx, &request("corr-2")).await;

        let final_response = h.bus.final_response("corr-2").unwrap();
        assert_eq!(
            final_response.response_info.response_code,
            ResponseCode::NewFileChecksumFailure
        );
        assert_eq!(h.archive.content("books", "file1").unwrap(), "");
        assert_eq!(h.archive.staged_count(), 0);
        assert_eq!(h.alarms.count(), 1);
    }
}
