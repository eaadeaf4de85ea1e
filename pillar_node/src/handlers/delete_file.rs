use super::{HandlerContext, PerformHandler, Performed};
use crate::audit::FileAction;
use crate::error::{HandlerResult, RequestHandlerError};
use crate::types::messages::{DeleteFileRequest, ResponsePayload};
use crate::types::{ChecksumData, ResponseCode};
use async_trait::async_trait;
use tracing::info;

/// Removes a file once the client proved it knows the stored content.
pub struct DeleteFileHandler;

/// Checks the client's checksum of the stored file. Shared with ReplaceFile.
///
/// A mismatch answers EXISTING_FILE_CHECKSUM_FAILURE without revealing the
/// stored value.
pub(crate) async fn verify_existing_file(
    ctx: &HandlerContext,
    collection_id: &str,
    file_id: &str,
    claimed: Option<&ChecksumData>,
) -> HandlerResult<()> {
    let claimed = match claimed {
        Some(claimed) => claimed,
        None if ctx.config.checksum.require_checksum_for_destructive_requests => {
            return Err(RequestHandlerError::illegal_operation(
                ResponseCode::ExistingFileChecksumFailure,
                "A checksum for the existing file is required by this pillar",
                file_id,
            ));
        }
        None => return Ok(()),
    };

    ctx.model.verify_checksum_spec(Some(&claimed.checksum_spec))?;
    if !ctx
        .model
        .verify_existing_checksum(collection_id, file_id, claimed)
        .await?
    {
        return Err(RequestHandlerError::illegal_operation(
            ResponseCode::ExistingFileChecksumFailure,
            format!(
                "The checksum of the existing file '{}' does not match the expected checksum",
                file_id
            ),
            file_id,
        ));
    }
    Ok(())
}

#[async_trait]
impl PerformHandler for DeleteFileHandler {
    type Request = DeleteFileRequest;

    const ACTION: FileAction = FileAction::DeleteFile;
    const LOCKS_FILE: bool = true;

    async fn validate(&self, ctx: &HandlerContext, request: &DeleteFileRequest) -> HandlerResult<()> {
        ctx.validate_pillar_id(&request.pillar_id)?;
        ctx.validate_file_id(&request.file_id)?;

        let collection_id = &request.header.collection_id;
        ctx.model
            .verify_file_exists(collection_id, &request.file_id)
            .await?;
        ctx.model
            .verify_checksum_spec(request.checksum_request_for_existing_file.as_ref())?;
        verify_existing_file(
            ctx,
            collection_id,
            &request.file_id,
            request.checksum_data_for_existing_file.as_ref(),
        )
        .await
    }

    async fn perform(&self, ctx: &HandlerContext, request: &DeleteFileRequest) -> HandlerResult<Performed> {
        let collection_id = &request.header.collection_id;

        let checksum_data = match &request.checksum_request_for_existing_file {
            Some(spec) => Some(
                ctx.model
                    .compute_checksum(collection_id, &request.file_id, spec)
                    .await?,
            ),
            None => None,
        };

        ctx.model.delete_file(collection_id, &request.file_id).await?;
        info!(
            "Deleted '{}' from collection '{}'",
            request.file_id, collection_id
        );

        Ok(Performed::new(
            ResponsePayload::Checksum { checksum_data },
            "Deleted file",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::run_perform;
    use super::super::test_support::*;
    use super::*;
    use crate::storage::FileArchive;
    use crate::types::{AlarmLevel, ChecksumSpec, ChecksumType};
    use chrono::Utc;

    fn request(correlation_id: &str, md5: &str) -> DeleteFileRequest {
        DeleteFileRequest {
            header: header(correlation_id),
            pillar_id: "pillar-1".to_string(),
            file_id: "file1".to_string(),
            checksum_data_for_existing_file: Some(ChecksumData {
                checksum_spec: ChecksumSpec::new(ChecksumType::Md5),
                checksum_value: md5.to_string(),
                calculation_timestamp: Utc::now(),
            }),
            checksum_request_for_existing_file: None,
        }
    }

    #[tokio::test]
    async fn test_mismatch_keeps_file_and_hides_stored_value() {
        let h = harness(AlarmLevel::Error);
        h.archive.insert("books", "file1", "");

        let request = request("corr-1", "00000000000000000000000000000000");
        let outcome = run_perform(&DeleteFileHandler, &h.ctx, &request).await;
        assert_eq!(outcome.action, FileAction::Failure);

        let responses = h.bus.responses_for("corr-1");
        assert_eq!(responses.len(), 1);
        let info = &responses[0].response_info;
        assert_eq!(info.response_code, ResponseCode::ExistingFileChecksumFailure);
        assert!(!info.response_text.contains("d41d8cd98f00b204e9800998ecf8427e"));
        assert!(h.archive.has_file("books", "file1").await.unwrap());
        assert_eq!(h.alarms.count(), 1);
    }

    #[tokio::test]
    async fn test_emergency_level_does_not_alarm_on_mismatch() {
        let h = harness(AlarmLevel::Emergency);
        h.archive.insert("books", "file1", "");

        let request = request("corr-2", "00000000000000000000000000000000");
        run_perform(&DeleteFileHandler, &h.ctx, &request).await;

        assert_eq!(h.alarms.count(), 0);
    }

    #[tokio::test]
    async fn test_delete_moves_file_to_retention() {
        let h = harness(AlarmLevel::Error);
        h.archive.insert("books", "file1", "");

        let request = request("corr-3", "d41d8cd98f00b204e9800998ecf8427e");
        let outcome = run_perform(&DeleteFileHandler, &h.ctx, &request).await;
        assert_eq!(outcome.action, FileAction::DeleteFile);

        assert!(!h.archive.has_file("books", "file1").await.unwrap());
        assert_eq!(h.archive.retained("books", "file1").len(), 1);
        assert!(h.ctx.locks.is_empty());
    }
}
