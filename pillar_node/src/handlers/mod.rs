// Request handlers
//
// One handler per message kind. Identify handlers only check whether the
// pillar can take part in an operation; perform handlers run the fixed
// validate, progress, perform, final template through `run_perform`.
//
// Handlers report failures as `RequestHandlerError` values. Nothing escapes
// the runners: every failure, panics included, ends in `handle_failure`,
// which picks the response and asks the alarm policy whether to escalate.

use crate::alarm::AlarmPolicy;
use crate::audit::{AuditTrailManager, FileAction};
use crate::bus::{MessageBus, OutboundMessage};
use crate::config::PillarConfig;
use crate::error::{HandlerResult, PillarError, RequestHandlerError};
use crate::exchange::FileExchange;
use crate::response::ResponseFactory;
use crate::storage::locks::FileLocks;
use crate::storage::model::ResultWindow;
use crate::storage::StorageModel;
use crate::types::messages::{MessageHeader, MessageResponse, Phase, Request, ResponsePayload};
use crate::types::{ChecksumSpec, Delivery, FileIds, ResponseCode, ResponseInfo, TimeMeasure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

mod audit_trails;
mod delete_file;
mod get_checksums;
mod get_file;
mod get_file_ids;
mod get_file_infos;
mod identify;
mod put_file;
mod replace_file;
mod status;

pub use audit_trails::GetAuditTrailsHandler;
pub use delete_file::DeleteFileHandler;
pub use get_checksums::GetChecksumsHandler;
pub use get_file::GetFileHandler;
pub use get_file_ids::GetFileIdsHandler;
pub use get_file_infos::GetFileInfosHandler;
pub use identify::{
    IdentifyForDeleteFile, IdentifyForGetAuditTrails, IdentifyForGetChecksums,
    IdentifyForGetFile, IdentifyForGetFileIds, IdentifyForGetFileInfos, IdentifyForGetStatus,
    IdentifyForPutFile, IdentifyForReplaceFile,
};
pub use put_file::PutFileHandler;
pub use replace_file::ReplaceFileHandler;
pub use status::GetStatusHandler;

/// Longest file id accepted
pub const MAX_FILE_ID_LENGTH: usize = 255;

/// Everything a handler may touch
pub struct HandlerContext {
    pub config: Arc<PillarConfig>,
    pub model: StorageModel,
    pub responses: ResponseFactory,
    pub bus: Arc<dyn MessageBus>,
    pub exchange: Arc<dyn FileExchange>,
    pub alarms: AlarmPolicy,
    pub audit: Arc<dyn AuditTrailManager>,
    pub locks: FileLocks,
}

impl HandlerContext {
    pub fn pillar_id(&self) -> &str {
        &self.config.pillar.pillar_id
    }

    /// Sends a response. A bus failure is logged; the conversation is over
    /// from this pillar's side either way.
    pub async fn send(&self, response: MessageResponse) {
        debug!(
            "Sending {:?} response {} for {}",
            response.stage, response.response_info.response_code, response.correlation_id
        );
        if let Err(e) = self.bus.send(OutboundMessage::Response(response)).await {
            error!("Failed to send response: {}", e);
        }
    }

    /// The collection must be one this pillar serves.
    pub fn validate_collection_id(&self, header: &MessageHeader) -> HandlerResult<()> {
        if !self
            .config
            .pillar
            .collection_ids
            .iter()
            .any(|c| *c == header.collection_id)
        {
            return Err(RequestHandlerError::IllegalArgument(format!(
                "The collection '{}' is not served by pillar '{}'",
                header.collection_id,
                self.pillar_id()
            )));
        }
        Ok(())
    }

    /// The request must be addressed to this pillar.
    pub fn validate_pillar_id(&self, pillar_id: &str) -> HandlerResult<()> {
        if pillar_id != self.pillar_id() {
            return Err(RequestHandlerError::IllegalArgument(format!(
                "The request was meant for '{}', not for '{}'",
                pillar_id,
                self.pillar_id()
            )));
        }
        Ok(())
    }

    /// File ids must be usable as archive names.
    pub fn validate_file_id(&self, file_id: &str) -> HandlerResult<()> {
        let problem = if file_id.is_empty() {
            Some("must not be empty")
        } else if file_id.chars().count() > MAX_FILE_ID_LENGTH {
            Some("is too long")
        } else if file_id.contains('/') || file_id.contains('\\') {
            Some("must not contain path separators")
        } else if file_id == "." || file_id.contains("..") {
            Some("must not contain '..'")
        } else {
            None
        };

        match problem {
            Some(problem) => Err(RequestHandlerError::invalid_message(
                ResponseCode::RequestNotUnderstoodFailure,
                format!("The file id '{}' {}", file_id, problem),
            )),
            None => Ok(()),
        }
    }

    /// A named file must be valid and exist; "all files" always passes.
    pub async fn verify_selection(&self, collection_id: &str, file_ids: &FileIds) -> HandlerResult<()> {
        if let FileIds::FileId(file_id) = file_ids {
            self.validate_file_id(file_id)?;
            self.model.verify_file_exists(collection_id, file_id).await?;
        }
        Ok(())
    }

    pub fn time_to_deliver(&self) -> TimeMeasure {
        TimeMeasure::from_millis(self.config.pillar.time_to_start_deliver_ms)
    }

    /// The spec a request asked for, or the pillar's default
    pub fn requested_spec(&self, requested: Option<&ChecksumSpec>) -> ChecksumSpec {
        requested
            .cloned()
            .unwrap_or_else(|| self.model.default_spec().clone())
    }

    /// Answers a failed conversation and applies the alarm policy. Returns
    /// the text recorded in the audit trail.
    pub async fn handle_failure<R: Request + Sync>(
        &self,
        request: &R,
        phase: Phase,
        failure: RequestHandlerError,
    ) -> String {
        let header = request.header();
        let collection_id = Some(header.collection_id.as_str());

        let info = match failure {
            RequestHandlerError::InvalidMessage { info } => {
                info!(
                    "{} request {} refused: {}",
                    R::OPERATION,
                    header.correlation_id,
                    info.response_text
                );
                Some(info)
            }
            RequestHandlerError::IllegalOperation { info, file_id } => {
                warn!(
                    "{} request {} not allowed: {}",
                    R::OPERATION,
                    header.correlation_id,
                    info.response_text
                );
                let file_id = file_id.as_deref().or_else(|| request.file_id());
                self.alarms
                    .handle_illegal_operation(collection_id, file_id, &info)
                    .await;
                Some(info)
            }
            RequestHandlerError::IllegalArgument(text) => {
                warn!(
                    "{} request {} has an illegal argument: {}",
                    R::OPERATION,
                    header.correlation_id,
                    text
                );
                self.alarms.handle_illegal_argument(collection_id, &text).await;
                match phase {
                    // Nobody expects an answer from a pillar outside the
                    // collection or the conversation.
                    Phase::Identify => {
                        return format!("Ignored {} identification: {}", R::OPERATION, text)
                    }
                    Phase::Perform => Some(ResponseInfo::new(
                        ResponseCode::RequestNotUnderstoodFailure,
                        text,
                    )),
                }
            }
            RequestHandlerError::Internal(e) => {
                error!(
                    "{} request {} failed: {}",
                    R::OPERATION,
                    header.correlation_id,
                    e
                );
                let text = e.to_string();
                self.alarms.handle_internal_failure(collection_id, &text).await;
                Some(ResponseInfo::new(ResponseCode::OperationFailed, text))
            }
        };

        let Some(info) = info else {
            return format!("Failed {}", R::OPERATION);
        };
        let description = format!(
            "Failed {}: {}: {}",
            R::OPERATION,
            info.response_code,
            info.response_text
        );
        let response = match phase {
            Phase::Identify => {
                self.responses
                    .build_identify(request, info, TimeMeasure::maximum())
            }
            Phase::Perform => self
                .responses
                .build_final(request, info, ResponsePayload::Empty),
        };
        self.send(response).await;
        description
    }
}

/// What the dispatcher records in the audit trail for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub action: FileAction,
    pub file_id: Option<String>,
    pub description: String,
}

/// Result of a successful perform step
pub struct Performed {
    pub payload: ResponsePayload,
    /// Audit text
    pub description: String,
}

impl Performed {
    pub fn new(payload: ResponsePayload, description: impl Into<String>) -> Self {
        Self {
            payload,
            description: description.into(),
        }
    }
}

/// Identify phase of one operation. Must not change any state.
#[async_trait]
pub trait IdentifyHandler: Send + Sync {
    type Request: Request + Send + Sync;

    async fn validate(&self, ctx: &HandlerContext, request: &Self::Request) -> HandlerResult<()>;
}

/// Perform phase of one operation
#[async_trait]
pub trait PerformHandler: Send + Sync {
    type Request: Request + Send + Sync;

    /// Recorded in the audit trail on success
    const ACTION: FileAction;

    /// Whether the conversation holds the file lock from validation until
    /// the final response
    const LOCKS_FILE: bool = false;

    async fn validate(&self, ctx: &HandlerContext, request: &Self::Request) -> HandlerResult<()>;

    /// The progress response, sent once validation passed
    async fn progress(
        &self,
        ctx: &HandlerContext,
        request: &Self::Request,
    ) -> HandlerResult<MessageResponse> {
        Ok(ctx.responses.build_progress(request))
    }

    async fn perform(&self, ctx: &HandlerContext, request: &Self::Request) -> HandlerResult<Performed>;
}

fn panic_failure(panic: Box<dyn Any + Send>) -> RequestHandlerError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    RequestHandlerError::Internal(PillarError::Internal(format!(
        "Request handler panicked: {}",
        message
    )))
}

/// Runs the identify phase and answers it.
pub async fn run_identify<H: IdentifyHandler>(
    handler: &H,
    ctx: &HandlerContext,
    request: &H::Request,
) -> Outcome {
    let file_id = request.file_id().map(str::to_owned);
    let operation = <H::Request as Request>::OPERATION;

    let checked = AssertUnwindSafe(async {
        ctx.validate_collection_id(request.header())?;
        handler.validate(ctx, request).await
    })
    .catch_unwind()
    .await
    .unwrap_or_else(|panic| Err(panic_failure(panic)));

    let description = match checked {
        Ok(()) => {
            let response = ctx.responses.build_identify(
                request,
                ResponseInfo::new(
                    ResponseCode::IdentificationPositive,
                    format!("Pillar '{}' can take part in {}", ctx.pillar_id(), operation),
                ),
                ctx.time_to_deliver(),
            );
            ctx.send(response).await;
            format!("Identified for {}", operation)
        }
        Err(failure) => ctx.handle_failure(request, Phase::Identify, failure).await,
    };

    Outcome {
        action: FileAction::Other,
        file_id,
        description,
    }
}

async fn perform_steps<H: PerformHandler>(
    handler: &H,
    ctx: &HandlerContext,
    request: &H::Request,
) -> HandlerResult<String> {
    ctx.validate_collection_id(request.header())?;
    handler.validate(ctx, request).await?;

    let progress = handler.progress(ctx, request).await?;
    ctx.send(progress).await;

    let performed = handler.perform(ctx, request).await?;
    let response = ctx.responses.build_final(
        request,
        ResponseInfo::new(
            ResponseCode::OperationCompleted,
            format!("{} completed", <H::Request as Request>::OPERATION),
        ),
        performed.payload,
    );
    ctx.send(response).await;
    Ok(performed.description)
}

/// Runs validate, progress, perform and final for one request.
pub async fn run_perform<H: PerformHandler>(
    handler: &H,
    ctx: &HandlerContext,
    request: &H::Request,
) -> Outcome {
    let file_id = request.file_id().map(str::to_owned);

    let _lock = match (&file_id, H::LOCKS_FILE) {
        (Some(file_id), true) => Some(
            ctx.locks
                .lock(&request.header().collection_id, file_id)
                .await,
        ),
        _ => None,
    };

    let result = AssertUnwindSafe(perform_steps(handler, ctx, request))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(panic_failure(panic)));

    match result {
        Ok(description) => Outcome {
            action: H::ACTION,
            file_id,
            description,
        },
        Err(failure) => Outcome {
            action: FileAction::Failure,
            description: ctx.handle_failure(request, Phase::Perform, failure).await,
            file_id,
        },
    }
}

/// Result window of an enumeration request
pub(crate) fn window(
    min_timestamp: Option<DateTime<Utc>>,
    max_timestamp: Option<DateTime<Utc>>,
    max_results: Option<u64>,
) -> ResultWindow {
    ResultWindow {
        min_timestamp,
        max_timestamp,
        max_results,
    }
}

/// Hands a result set to the client: inline, or written to a temporary file
/// and uploaded when the request named a result address.
pub(crate) async fn deliver<T>(
    ctx: &HandlerContext,
    entries: Vec<T>,
    result_address: Option<&str>,
) -> HandlerResult<Delivery<T>>
where
    T: Serialize + Send + 'static,
{
    let Some(address) = result_address else {
        return Ok(Delivery::Inline { entries });
    };

    let count = entries.len();
    let file = tokio::task::spawn_blocking(move || -> crate::error::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        serde_json::to_writer(&mut file, &entries)?;
        file.flush()?;
        Ok(file)
    })
    .await
    .map_err(PillarError::from)??;

    ctx.exchange
        .upload_file(file.path(), address)
        .await
        .map_err(RequestHandlerError::from_transfer)?;
    debug!("Delivered {} results to {}", count, address);

    Ok(Delivery::ResultAddress {
        address: address.to_string(),
    })
}
