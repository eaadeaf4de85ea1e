use super::{deliver, window, HandlerContext, PerformHandler, Performed};
use crate::audit::FileAction;
use crate::error::HandlerResult;
use crate::types::messages::{GetChecksumsRequest, ResponsePayload};
use async_trait::async_trait;

/// Checksums of one file or of the whole collection
pub struct GetChecksumsHandler;

#[async_trait]
impl PerformHandler for GetChecksumsHandler {
    type Request = GetChecksumsRequest;

    const ACTION: FileAction = FileAction::GetChecksums;

    async fn validate(&self, ctx: &HandlerContext, request: &GetChecksumsRequest) -> HandlerResult<()> {
        ctx.validate_pillar_id(&request.pillar_id)?;
        ctx.model
            .verify_checksum_spec(request.checksum_request.as_ref())?;
        ctx.verify_selection(&request.header.collection_id, &request.file_ids)
            .await
    }

    async fn perform(&self, ctx: &HandlerContext, request: &GetChecksumsRequest) -> HandlerResult<Performed> {
        let checksum_spec = ctx.requested_spec(request.checksum_request.as_ref());
        let results = ctx
            .model
            .checksum_results(
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
            ResponsePayload::Checksums {
                checksum_spec,
                delivery,
                partial_result,
            },
            format!("Delivered {} checksums", count),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::run_perform;
    use super::super::test_support::*;
    use super::*;
    use crate::types::{
        AlarmLevel, ChecksumDataItem, ChecksumSpec, ChecksumType, Delivery, FileIds, ResponseCode,
    };

    fn request(correlation_id: &str, max: Option<u64>) -> GetChecksumsRequest {
        GetChecksumsRequest {
            header: header(correlation_id),
            pillar_id: "pillar-1".to_string(),
            file_ids: FileIds::AllFileIds,
            checksum_request: None,
            result_address: None,
            min_timestamp: None,
            max_timestamp: None,
            max_number_of_results: max,
        }
    }

    fn inline_checksums(payload: ResponsePayload) -> (Vec<ChecksumDataItem>, bool) {
        match payload {
            ResponsePayload::Checksums {
                delivery: Delivery::Inline { entries },
                partial_result,
                ..
            } => (entries, partial_result),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_result_cap_sets_partial_flag() {
        let h = harness(AlarmLevel::Error);
        for i in 0..12 {
            h.archive.insert("books", &format!("file{:02}", i), format!("content {}", i));
        }

        run_perform(&GetChecksumsHandler, &h.ctx, &request("corr-1", Some(5))).await;
        let (entries, partial) = inline_checksums(h.bus.final_response("corr-1").unwrap().payload);
        assert_eq!(entries.len(), 5);
        assert!(partial);

        run_perform(&GetChecksumsHandler, &h.ctx, &request("corr-2", None)).await;
        let (entries, partial) = inline_checksums(h.bus.final_response("corr-2").unwrap().payload);
        assert_eq!(entries.len(), 12);
        assert!(!partial);
    }

    #[tokio::test]
    async fn test_unknown_other_algorithm_is_not_understood() {
        let h = harness(AlarmLevel::Error);
        h.archive.insert("books", "file1", "content");

        let mut request = request("corr-3", None);
        request.checksum_request = Some(ChecksumSpec::other("WHIRLPOOL"));
        run_perform(&GetChecksumsHandler, &h.ctx, &request).await;

        let responses = h.bus.responses_for("corr-3");
        assert_eq!(responses.len(), 1);
        assert_eq!(
            responses[0].response_info.response_code,
            ResponseCode::RequestNotUnderstoodFailure
        );
    }

    #[tokio::test]
    async fn test_results_uploaded_to_address() {
        let h = harness(AlarmLevel::Error);
        h.archive.insert("books", "file1", "content");

        let mut request = request("corr-4", None);
        request.file_ids = FileIds::FileId("file1".to_string());
        request.checksum_request = Some(ChecksumSpec::new(ChecksumType::Sha1));
        request.result_address = Some("mem://results/corr-4".to_string());
        run_perform(&GetChecksumsHandler, &h.ctx, &request).await;

        match h.bus.final_response("corr-4").unwrap().payload {
            ResponsePayload::Checksums {
                delivery: Delivery::ResultAddress { address },
                checksum_spec,
                ..
            } => {
                assert_eq!(address, "mem://results/corr-4");
                assert_eq!(checksum_spec.checksum_type, ChecksumType::Sha1);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        let uploaded = h.exchange.get("mem://results/corr-4").unwrap();
        let items: Vec<ChecksumDataItem> = serde_json::from_slice(&uploaded).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].file_id, "file1");
    }
}
