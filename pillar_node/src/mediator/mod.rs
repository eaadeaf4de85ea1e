// Message dispatch
//
// The mediator owns the registry of message kinds this pillar answers and
// routes every decoded message to its handler. Each message, answered or
// not, leaves exactly one audit event behind.

use crate::audit::{AuditRecord, FileAction};
use crate::handlers::{
    run_identify, run_perform, DeleteFileHandler, GetAuditTrailsHandler, GetChecksumsHandler,
    GetFileHandler, GetFileIdsHandler, GetFileInfosHandler, GetStatusHandler, HandlerContext,
    IdentifyForDeleteFile, IdentifyForGetAuditTrails, IdentifyForGetChecksums, IdentifyForGetFile,
    IdentifyForGetFileIds, IdentifyForGetFileInfos, IdentifyForGetStatus, IdentifyForPutFile,
    IdentifyForReplaceFile, Outcome, PutFileHandler, ReplaceFileHandler,
};
use crate::types::messages::{MalformedMessage, Message, MessageKind, OperationKind, Phase};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const OPERATIONS: [OperationKind; 9] = [
    OperationKind::GetFile,
    OperationKind::GetFileIds,
    OperationKind::GetChecksums,
    OperationKind::GetFileInfos,
    OperationKind::PutFile,
    OperationKind::DeleteFile,
    OperationKind::ReplaceFile,
    OperationKind::GetStatus,
    OperationKind::GetAuditTrails,
];

/// Routes inbound messages to the pillar's handlers
pub struct PillarMediator {
    ctx: Arc<HandlerContext>,
    registered: HashSet<MessageKind>,
}

impl PillarMediator {
    /// Registers every operation. A checksum pillar holds no file bytes and
    /// does not take part in GetFile conversations.
    pub fn new(ctx: Arc<HandlerContext>) -> Self {
        let mut registered: HashSet<MessageKind> = OPERATIONS
            .iter()
            .flat_map(|op| [MessageKind::identify(*op), MessageKind::perform(*op)])
            .collect();

        if ctx.model.is_checksum_pillar() {
            registered.remove(&MessageKind::identify(OperationKind::GetFile));
            registered.remove(&MessageKind::perform(OperationKind::GetFile));
        }

        info!(
            "Pillar '{}' answers {} message kinds",
            ctx.pillar_id(),
            registered.len()
        );

        Self { ctx, registered }
    }

    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.ctx
    }

    pub fn is_registered(&self, kind: MessageKind) -> bool {
        self.registered.contains(&kind)
    }

    /// Handles one message to completion and records its audit event.
    pub async fn dispatch(&self, message: Message) {
        debug!(
            "Dispatching {} ({:?})",
            message.type_name(),
            message.header().map(|h| h.correlation_id.as_str())
        );

        let outcome = match message.kind() {
            Some(kind) if self.is_registered(kind) => self.route(&message).await,
            _ => self.unhandled(&message).await,
        };

        let header = message.header();
        self.ctx
            .audit
            .record(AuditRecord {
                collection_id: header
                    .map(|h| h.collection_id.clone())
                    .unwrap_or_default(),
                file_id: outcome.file_id,
                actor: header
                    .map(|h| h.from.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                description: outcome.description,
                audit_trail_information: header.and_then(|h| h.audit_trail_information.clone()),
                action: outcome.action,
                correlation_id: header.map(|h| h.correlation_id.clone()),
            })
            .await;
    }

    async fn route(&self, message: &Message) -> Outcome {
        let ctx = self.ctx.as_ref();
        match message {
            Message::IdentifyPillarsForGetFileRequest(r) => {
                run_identify(&IdentifyForGetFile, ctx, r).await
            }
            Message::GetFileRequest(r) => run_perform(&GetFileHandler, ctx, r).await,
            Message::IdentifyPillarsForGetFileIDsRequest(r) => {
                run_identify(&IdentifyForGetFileIds, ctx, r).await
            }
            Message::GetFileIDsRequest(r) => run_perform(&GetFileIdsHandler, ctx, r).await,
            Message::IdentifyPillarsForGetChecksumsRequest(r) => {
                run_identify(&IdentifyForGetChecksums, ctx, r).await
            }
            Message::GetChecksumsRequest(r) => run_perform(&GetChecksumsHandler, ctx, r).await,
            Message::IdentifyPillarsForGetFileInfosRequest(r) => {
                run_identify(&IdentifyForGetFileInfos, ctx, r).await
            }
            Message::GetFileInfosRequest(r) => run_perform(&GetFileInfosHandler, ctx, r).await,
            Message::IdentifyPillarsForPutFileRequest(r) => {
                run_identify(&IdentifyForPutFile, ctx, r).await
            }
            Message::PutFileRequest(r) => run_perform(&PutFileHandler, ctx, r).await,
            Message::IdentifyPillarsForDeleteFileRequest(r) => {
                run_identify(&IdentifyForDeleteFile, ctx, r).await
            }
            Message::DeleteFileRequest(r) => run_perform(&DeleteFileHandler, ctx, r).await,
            Message::IdentifyPillarsForReplaceFileRequest(r) => {
                run_identify(&IdentifyForReplaceFile, ctx, r).await
            }
            Message::ReplaceFileRequest(r) => run_perform(&ReplaceFileHandler, ctx, r).await,
            Message::IdentifyContributorsForGetStatusRequest(r) => {
                run_identify(&IdentifyForGetStatus, ctx, r).await
            }
            Message::GetStatusRequest(r) => run_perform(&GetStatusHandler, ctx, r).await,
            Message::IdentifyContributorsForGetAuditTrailsRequest(r) => {
                run_identify(&IdentifyForGetAuditTrails, ctx, r).await
            }
            Message::GetAuditTrailsRequest(r) => {
                run_perform(&GetAuditTrailsHandler, ctx, r).await
            }
            Message::Malformed(malformed) => self.malformed(malformed).await,
            Message::Unrecognized(_) => self.unhandled(message).await,
        }
    }

    /// A known kind whose body could not be read. Handled like an illegal
    /// argument, except that the sender is answered whenever its header is
    /// readable.
    async fn malformed(&self, message: &MalformedMessage) -> Outcome {
        let header = message.header.as_ref();
        let text = format!(
            "Could not read {}: {}",
            message.type_name, message.reason
        );
        warn!(
            "Pillar '{}' refused {:?}: {}",
            self.ctx.pillar_id(),
            header.map(|h| h.correlation_id.as_str()),
            text
        );
        self.ctx
            .alarms
            .handle_illegal_argument(header.map(|h| h.collection_id.as_str()), &text)
            .await;

        if let Some(header) = header {
            let response = self
                .ctx
                .responses
                .build_not_understood(header, message.kind, text.clone());
            self.ctx.send(response).await;
        }

        let action = match message.kind.phase {
            Phase::Identify => FileAction::Other,
            Phase::Perform => FileAction::Failure,
        };
        Outcome {
            action,
            file_id: None,
            description: format!("Failed {}: {}", message.kind.operation, text),
        }
    }

    /// No response goes out; the sender learns nothing from this pillar.
    async fn unhandled(&self, message: &Message) -> Outcome {
        let collection_id = message.header().map(|h| h.collection_id.as_str());
        warn!(
            "Pillar '{}' does not handle {}",
            self.ctx.pillar_id(),
            message.type_name()
        );
        self.ctx
            .alarms
            .handle_unhandled_message(collection_id, message.type_name())
            .await;

        Outcome {
            action: FileAction::Other,
            file_id: message.file_id().map(str::to_owned),
            description: format!("Unhandled message of type '{}'", message.type_name()),
        }
    }
}
