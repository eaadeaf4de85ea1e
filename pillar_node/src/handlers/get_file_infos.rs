use super::{deliver, window, HandlerContext, PerformHandler, Performed};
use crate::audit::FileAction;
use crate::error::HandlerResult;
use crate::types::messages::{GetFileInfosRequest, ResponsePayload};
use async_trait::async_trait;

/// Checksum, size and modification time per file, paged like GetChecksums
pub struct GetFileInfosHandler;

#[async_trait]
impl PerformHandler for GetFileInfosHandler {
    type Request = GetFileInfosRequest;

    const ACTION: FileAction = FileAction::GetFileInfos;

    async fn validate(&self, ctx: &HandlerContext, request: &GetFileInfosRequest) -> HandlerResult<()> {
        ctx.validate_pillar_id(&request.pillar_id)?;
        ctx.model
            .verify_checksum_spec(request.checksum_request.as_ref())?;
        ctx.verify_selection(&request.header.collection_id, &request.file_ids)
            .await
    }

    async fn perform(&self, ctx: &HandlerContext, request: &GetFileInfosRequest) -> HandlerResult<Performed> {
        let checksum_spec = ctx.requested_spec(request.checksum_request.as_ref());
        let results = ctx
            .model
            .file_info_results(
                &request.header.collection_id,
                &request.file_ids,
                &checksum_spec,
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
            ResponsePayload::FileInfos {
                checksum_spec,
                delivery,
                partial_result,
            },
            format!("Delivered {} file infos", count),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::run_perform;
    use super::super::test_support::*;
    use super::*;
    use crate::types::{AlarmLevel, Delivery, FileIds};

    #[tokio::test]
    async fn test_infos_carry_checksum_and_size() {
        let h = harness(AlarmLevel::Error);
        h.archive.insert("books", "file1", "");
        h.archive.insert("books", "file2", "data");

        let request = GetFileInfosRequest {
            header: header("corr-1"),
            pillar_id: "pillar-1".to_string(),
            file_ids: FileIds::AllFileIds,
            checksum_request: None,
            result_address: None,
            min_timestamp: None,
            max_timestamp: None,
            max_number_of_results: Some(1),
        };
        run_perform(&GetFileInfosHandler, &h.ctx, &request).await;

        match h.bus.final_response("corr-1").unwrap().payload {
            ResponsePayload::FileInfos {
                delivery: Delivery::Inline { entries },
                partial_result,
                ..
            } => {
                assert!(partial_result);
                assert_eq!(entries.len(), 1);
                let info = &entries[0];
                let expected = if info.file_id == "file1" {
                    ("d41d8cd98f00b204e9800998ecf8427e", 0)
                } else {
                    ("8d777f385d3dfec8815d20f7496026dc", 4)
                };
                assert_eq!(info.checksum_value, expected.0);
                assert_eq!(info.file_size, Some(expected.1));
                assert!(info.last_modification_time.is_some());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
