// Response building
//
// Turns a request plus an outcome into the outbound response envelope. Building
// has no side effects; handlers decide when a response is sent.

use crate::types::messages::{
    MessageHeader, MessageKind, MessageResponse, OperationKind, Phase, Request, ResponsePayload,
    ResponseStage, PROTOCOL_VERSION, MIN_PROTOCOL_VERSION,
};
use crate::types::{ResponseCode, ResponseInfo, TimeMeasure};

/// Builds responses on behalf of one pillar
#[derive(Debug, Clone)]
pub struct ResponseFactory {
    pillar_id: String,
    receiver_destination: String,
}

impl ResponseFactory {
    /// `receiver_destination` is where requesters can reach this pillar.
    pub fn new(pillar_id: impl Into<String>, receiver_destination: impl Into<String>) -> Self {
        Self {
            pillar_id: pillar_id.into(),
            receiver_destination: receiver_destination.into(),
        }
    }

    pub fn pillar_id(&self) -> &str {
        &self.pillar_id
    }

    fn envelope<R: Request>(
        &self,
        request: &R,
        stage: ResponseStage,
        response_info: ResponseInfo,
        payload: ResponsePayload,
    ) -> MessageResponse {
        self.envelope_for(
            request.header(),
            R::OPERATION,
            request.file_id().map(str::to_owned),
            stage,
            response_info,
            payload,
        )
    }

    fn envelope_for(
        &self,
        header: &MessageHeader,
        operation: OperationKind,
        file_id: Option<String>,
        stage: ResponseStage,
        response_info: ResponseInfo,
        payload: ResponsePayload,
    ) -> MessageResponse {
        MessageResponse {
            correlation_id: header.correlation_id.clone(),
            collection_id: header.collection_id.clone(),
            from: self.pillar_id.clone(),
            to: header.reply_to.clone(),
            reply_to: self.receiver_destination.clone(),
            version: PROTOCOL_VERSION,
            min_version: MIN_PROTOCOL_VERSION,
            operation,
            stage,
            response_info,
            file_id,
            payload,
        }
    }

    /// Answer to an identify request
    pub fn build_identify<R: Request>(
        &self,
        request: &R,
        response_info: ResponseInfo,
        time_to_deliver: TimeMeasure,
    ) -> MessageResponse {
        self.envelope(
            request,
            ResponseStage::Identify,
            response_info,
            ResponsePayload::Identification { time_to_deliver },
        )
    }

    /// The progress response sent once a perform request passed validation
    pub fn build_progress<R: Request>(&self, request: &R) -> MessageResponse {
        self.build_progress_with(request, ResponsePayload::Empty)
    }

    pub fn build_progress_with<R: Request>(
        &self,
        request: &R,
        payload: ResponsePayload,
    ) -> MessageResponse {
        self.envelope(
            request,
            ResponseStage::Progress,
            ResponseInfo::new(
                ResponseCode::OperationAcceptedProgress,
                format!("Started {} operation", R::OPERATION),
            ),
            payload,
        )
    }

    pub fn build_final<R: Request>(
        &self,
        request: &R,
        response_info: ResponseInfo,
        payload: ResponsePayload,
    ) -> MessageResponse {
        self.envelope(request, ResponseStage::Final, response_info, payload)
    }

    /// Refusal of a message whose body could not be read. Only the header is
    /// known, so identify refusals rule the pillar out with the maximum
    /// delivery time and perform refusals end the conversation.
    pub fn build_not_understood(
        &self,
        header: &MessageHeader,
        kind: MessageKind,
        text: impl Into<String>,
    ) -> MessageResponse {
        let info = ResponseInfo::new(ResponseCode::RequestNotUnderstoodFailure, text);
        let (stage, payload) = match kind.phase {
            Phase::Identify => (
                ResponseStage::Identify,
                ResponsePayload::Identification {
                    time_to_deliver: TimeMeasure::maximum(),
                },
            ),
            Phase::Perform => (ResponseStage::Final, ResponsePayload::Empty),
        };
        self.envelope_for(header, kind.operation, None, stage, info, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::messages::DeleteFileRequest;

    fn request() -> DeleteFileRequest {
        DeleteFileRequest {
            header: MessageHeader {
                correlation_id: "corr-1".to_string(),
                collection_id: "books".to_string(),
                from: "client".to_string(),
                reply_to: "http://client/replies".to_string(),
                version: 1,
                min_version: 1,
                audit_trail_information: None,
            },
            pillar_id: "pillar-1".to_string(),
            file_id: "file1".to_string(),
            checksum_data_for_existing_file: None,
            checksum_request_for_existing_file: None,
        }
    }

    #[test]
    fn test_responses_mirror_the_request() {
        let factory = ResponseFactory::new("pillar-1", "http://pillar-1/messages");
        let response = factory.build_progress(&request());

        assert_eq!(response.correlation_id, "corr-1");
        assert_eq!(response.collection_id, "books");
        assert_eq!(response.from, "pillar-1");
        assert_eq!(response.to, "http://client/replies");
        assert_eq!(response.reply_to, "http://pillar-1/messages");
        assert_eq!(response.operation, OperationKind::DeleteFile);
        assert_eq!(response.stage, ResponseStage::Progress);
        assert_eq!(response.file_id.as_deref(), Some("file1"));
        assert_eq!(
            response.response_info.response_code,
            ResponseCode::OperationAcceptedProgress
        );
    }

    #[test]
    fn test_identify_carries_time_to_deliver() {
        let factory = ResponseFactory::new("pillar-1", "http://pillar-1/messages");
        let response = factory.build_identify(
            &request(),
            ResponseInfo::new(ResponseCode::FileNotFoundFailure, "missing"),
            TimeMeasure::maximum(),
        );

        assert_eq!(response.stage, ResponseStage::Identify);
        match response.payload {
            ResponsePayload::Identification { time_to_deliver } => {
                assert!(time_to_deliver.is_maximum())
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_not_understood_follows_the_phase() {
        let factory = ResponseFactory::new("pillar-1", "http://pillar-1/messages");
        let header = request().header;

        let identify = factory.build_not_understood(
            &header,
            MessageKind::identify(OperationKind::PutFile),
            "unreadable",
        );
        assert_eq!(identify.stage, ResponseStage::Identify);
        assert_eq!(identify.operation, OperationKind::PutFile);
        assert!(matches!(
            identify.payload,
            ResponsePayload::Identification { time_to_deliver } if time_to_deliver.is_maximum()
        ));

        let perform = factory.build_not_understood(
            &header,
            MessageKind::perform(OperationKind::DeleteFile),
            "unreadable",
        );
        assert_eq!(perform.stage, ResponseStage::Final);
        assert_eq!(perform.to, "http://client/replies");
        assert_eq!(perform.file_id, None);
        assert_eq!(
            perform.response_info.response_code,
            ResponseCode::RequestNotUnderstoodFailure
        );
    }
}
