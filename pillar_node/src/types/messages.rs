// Inbound requests and outbound responses
//
// Every inbound message decodes into the `Message` sum type, tagged by its
// `type` field. Message kinds this pillar does not know still decode, into
// `Message::Unrecognized`, so the dispatcher can audit and alarm on them.

use super::{
    ChecksumData, ChecksumDataItem, ChecksumSpec, Delivery, FileIds, FileIdsDataItem,
    FileInfosDataItem, FilePart, ResponseInfo, ResultingStatus, TimeMeasure,
};
use crate::audit::AuditTrailEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version spoken by this pillar
pub const PROTOCOL_VERSION: u32 = 2;
/// Oldest protocol version this pillar still answers
pub const MIN_PROTOCOL_VERSION: u32 = 1;

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

fn default_min_version() -> u32 {
    MIN_PROTOCOL_VERSION
}

/// Conversation fields common to every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub correlation_id: String,
    pub collection_id: String,
    /// Component that sent the request
    pub from: String,
    /// Destination the responses go to
    pub reply_to: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_min_version")]
    pub min_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_trail_information: Option<String>,
}

/// The operations a pillar takes part in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    GetFile,
    GetFileIds,
    GetChecksums,
    GetFileInfos,
    PutFile,
    DeleteFile,
    ReplaceFile,
    GetStatus,
    GetAuditTrails,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::GetFile => "GetFile",
            OperationKind::GetFileIds => "GetFileIDs",
            OperationKind::GetChecksums => "GetChecksums",
            OperationKind::GetFileInfos => "GetFileInfos",
            OperationKind::PutFile => "PutFile",
            OperationKind::DeleteFile => "DeleteFile",
            OperationKind::ReplaceFile => "ReplaceFile",
            OperationKind::GetStatus => "GetStatus",
            OperationKind::GetAuditTrails => "GetAuditTrails",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Identify,
    Perform,
}

/// Key of the dispatcher's handler registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKind {
    pub operation: OperationKind,
    pub phase: Phase,
}

impl MessageKind {
    pub const fn identify(operation: OperationKind) -> Self {
        Self {
            operation,
            phase: Phase::Identify,
        }
    }

    pub const fn perform(operation: OperationKind) -> Self {
        Self {
            operation,
            phase: Phase::Perform,
        }
    }
}

/// Common view of a request, used to build responses and audit records
pub trait Request {
    const OPERATION: OperationKind;

    fn header(&self) -> &MessageHeader;

    /// The single file the request is about, if any
    fn file_id(&self) -> Option<&str> {
        None
    }
}

macro_rules! impl_request {
    ($ty:ty, $op:expr) => {
        impl Request for $ty {
            const OPERATION: OperationKind = $op;
            fn header(&self) -> &MessageHeader {
                &self.header
            }
        }
    };
    ($ty:ty, $op:expr, file_id) => {
        impl Request for $ty {
            const OPERATION: OperationKind = $op;
            fn header(&self) -> &MessageHeader {
                &self.header
            }
            fn file_id(&self) -> Option<&str> {
                Some(&self.file_id)
            }
        }
    };
    ($ty:ty, $op:expr, file_ids) => {
        impl Request for $ty {
            const OPERATION: OperationKind = $op;
            fn header(&self) -> &MessageHeader {
                &self.header
            }
            fn file_id(&self) -> Option<&str> {
                self.file_ids.file_id()
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPillarsForGetFileRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFileRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub pillar_id: String,
    pub file_id: String,
    /// Where the file bytes are uploaded to
    pub file_address: String,
    #[serde(default)]
    pub file_part: Option<FilePart>,
    /// Checksum to attach to the progress response
    #[serde(default)]
    pub checksum_request: Option<ChecksumSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPillarsForGetFileIDsRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub file_ids: FileIds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFileIDsRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub pillar_id: String,
    pub file_ids: FileIds,
    #[serde(default)]
    pub result_address: Option<String>,
    #[serde(default)]
    pub min_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_number_of_results: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPillarsForGetChecksumsRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub file_ids: FileIds,
    #[serde(default)]
    pub checksum_request: Option<ChecksumSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetChecksumsRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub pillar_id: String,
    pub file_ids: FileIds,
    /// Defaults to the pillar's own checksum spec
    #[serde(default)]
    pub checksum_request: Option<ChecksumSpec>,
    #[serde(default)]
    pub result_address: Option<String>,
    #[serde(default)]
    pub min_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_number_of_results: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPillarsForGetFileInfosRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub file_ids: FileIds,
    #[serde(default)]
    pub checksum_request: Option<ChecksumSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFileInfosRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub pillar_id: String,
    pub file_ids: FileIds,
    #[serde(default)]
    pub checksum_request: Option<ChecksumSpec>,
    #[serde(default)]
    pub result_address: Option<String>,
    #[serde(default)]
    pub min_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_number_of_results: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPillarsForPutFileRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutFileRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub pillar_id: String,
    pub file_id: String,
    /// Where the new file is downloaded from
    pub file_address: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub checksum_data_for_new_file: Option<ChecksumData>,
    #[serde(default)]
    pub checksum_request_for_new_file: Option<ChecksumSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPillarsForDeleteFileRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFileRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub pillar_id: String,
    pub file_id: String,
    #[serde(default)]
    pub checksum_data_for_existing_file: Option<ChecksumData>,
    #[serde(default)]
    pub checksum_request_for_existing_file: Option<ChecksumSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPillarsForReplaceFileRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceFileRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub pillar_id: String,
    pub file_id: String,
    pub file_address: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub checksum_data_for_existing_file: Option<ChecksumData>,
    #[serde(default)]
    pub checksum_request_for_existing_file: Option<ChecksumSpec>,
    #[serde(default)]
    pub checksum_data_for_new_file: Option<ChecksumData>,
    #[serde(default)]
    pub checksum_request_for_new_file: Option<ChecksumSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyContributorsForGetStatusRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetStatusRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub contributor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyContributorsForGetAuditTrailsRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAuditTrailsRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub contributor: String,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub min_sequence_number: Option<u64>,
    #[serde(default)]
    pub max_sequence_number: Option<u64>,
    #[serde(default)]
    pub min_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result_address: Option<String>,
}

impl_request!(IdentifyPillarsForGetFileRequest, OperationKind::GetFile, file_id);
impl_request!(GetFileRequest, OperationKind::GetFile, file_id);
impl_request!(IdentifyPillarsForGetFileIDsRequest, OperationKind::GetFileIds, file_ids);
impl_request!(GetFileIDsRequest, OperationKind::GetFileIds, file_ids);
impl_request!(IdentifyPillarsForGetChecksumsRequest, OperationKind::GetChecksums, file_ids);
impl_request!(GetChecksumsRequest, OperationKind::GetChecksums, file_ids);
impl_request!(IdentifyPillarsForGetFileInfosRequest, OperationKind::GetFileInfos, file_ids);
impl_request!(GetFileInfosRequest, OperationKind::GetFileInfos, file_ids);
impl_request!(IdentifyPillarsForPutFileRequest, OperationKind::PutFile, file_id);
impl_request!(PutFileRequest, OperationKind::PutFile, file_id);
impl_request!(IdentifyPillarsForDeleteFileRequest, OperationKind::DeleteFile, file_id);
impl_request!(DeleteFileRequest, OperationKind::DeleteFile, file_id);
impl_request!(IdentifyPillarsForReplaceFileRequest, OperationKind::ReplaceFile, file_id);
impl_request!(ReplaceFileRequest, OperationKind::ReplaceFile, file_id);
impl_request!(IdentifyContributorsForGetStatusRequest, OperationKind::GetStatus);
impl_request!(GetStatusRequest, OperationKind::GetStatus);
impl_request!(IdentifyContributorsForGetAuditTrailsRequest, OperationKind::GetAuditTrails);

impl Request for GetAuditTrailsRequest {
    const OPERATION: OperationKind = OperationKind::GetAuditTrails;

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn file_id(&self) -> Option<&str> {
        self.file_id.as_deref()
    }
}

/// A message type this pillar has no definition for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedMessage {
    pub kind: String,
    /// Header fields, when the message carried them
    pub header: Option<MessageHeader>,
}

/// A known message type whose body could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedMessage {
    pub type_name: String,
    pub kind: MessageKind,
    /// Header fields, when those at least were readable
    pub header: Option<MessageHeader>,
    /// Why the body was rejected
    pub reason: String,
}

/// Every inbound message, decided at decode time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    IdentifyPillarsForGetFileRequest(IdentifyPillarsForGetFileRequest),
    GetFileRequest(GetFileRequest),
    IdentifyPillarsForGetFileIDsRequest(IdentifyPillarsForGetFileIDsRequest),
    GetFileIDsRequest(GetFileIDsRequest),
    IdentifyPillarsForGetChecksumsRequest(IdentifyPillarsForGetChecksumsRequest),
    GetChecksumsRequest(GetChecksumsRequest),
    IdentifyPillarsForGetFileInfosRequest(IdentifyPillarsForGetFileInfosRequest),
    GetFileInfosRequest(GetFileInfosRequest),
    IdentifyPillarsForPutFileRequest(IdentifyPillarsForPutFileRequest),
    PutFileRequest(PutFileRequest),
    IdentifyPillarsForDeleteFileRequest(IdentifyPillarsForDeleteFileRequest),
    DeleteFileRequest(DeleteFileRequest),
    IdentifyPillarsForReplaceFileRequest(IdentifyPillarsForReplaceFileRequest),
    ReplaceFileRequest(ReplaceFileRequest),
    IdentifyContributorsForGetStatusRequest(IdentifyContributorsForGetStatusRequest),
    GetStatusRequest(GetStatusRequest),
    IdentifyContributorsForGetAuditTrailsRequest(IdentifyContributorsForGetAuditTrailsRequest),
    GetAuditTrailsRequest(GetAuditTrailsRequest),
    #[serde(skip)]
    Unrecognized(UnrecognizedMessage),
    #[serde(skip)]
    Malformed(MalformedMessage),
}

const MESSAGE_TYPES: &[(&str, MessageKind)] = &[
    ("IdentifyPillarsForGetFileRequest", MessageKind::identify(OperationKind::GetFile)),
    ("GetFileRequest", MessageKind::perform(OperationKind::GetFile)),
    ("IdentifyPillarsForGetFileIDsRequest", MessageKind::identify(OperationKind::GetFileIds)),
    ("GetFileIDsRequest", MessageKind::perform(OperationKind::GetFileIds)),
    ("IdentifyPillarsForGetChecksumsRequest", MessageKind::identify(OperationKind::GetChecksums)),
    ("GetChecksumsRequest", MessageKind::perform(OperationKind::GetChecksums)),
    ("IdentifyPillarsForGetFileInfosRequest", MessageKind::identify(OperationKind::GetFileInfos)),
    ("GetFileInfosRequest", MessageKind::perform(OperationKind::GetFileInfos)),
    ("IdentifyPillarsForPutFileRequest", MessageKind::identify(OperationKind::PutFile)),
    ("PutFileRequest", MessageKind::perform(OperationKind::PutFile)),
    ("IdentifyPillarsForDeleteFileRequest", MessageKind::identify(OperationKind::DeleteFile)),
    ("DeleteFileRequest", MessageKind::perform(OperationKind::DeleteFile)),
    ("IdentifyPillarsForReplaceFileRequest", MessageKind::identify(OperationKind::ReplaceFile)),
    ("ReplaceFileRequest", MessageKind::perform(OperationKind::ReplaceFile)),
    ("IdentifyContributorsForGetStatusRequest", MessageKind::identify(OperationKind::GetStatus)),
    ("GetStatusRequest", MessageKind::perform(OperationKind::GetStatus)),
    (
        "IdentifyContributorsForGetAuditTrailsRequest",
        MessageKind::identify(OperationKind::GetAuditTrails),
    ),
    ("GetAuditTrailsRequest", MessageKind::perform(OperationKind::GetAuditTrails)),
];

impl MessageKind {
    /// The registry key named by a message's `type` field
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        MESSAGE_TYPES
            .iter()
            .find(|(name, _)| *name == type_name)
            .map(|(_, kind)| *kind)
    }
}

impl Message {
    /// Decodes a JSON message.
    ///
    /// Unknown `type` values yield `Message::Unrecognized` and known types
    /// whose body does not parse yield `Message::Malformed`, so both still
    /// reach the mediator. Only input without a readable `type` is an error.
    pub fn decode(value: Value) -> Result<Self, serde_json::Error> {
        let Some(type_name) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
            return serde_json::from_value(value);
        };
        let header = || serde_json::from_value::<MessageHeader>(value.clone()).ok();

        let Some(kind) = MessageKind::from_type_name(&type_name) else {
            return Ok(Message::Unrecognized(UnrecognizedMessage {
                kind: type_name,
                header: header(),
            }));
        };
        match serde_json::from_value(value.clone()) {
            Ok(message) => Ok(message),
            Err(e) => Ok(Message::Malformed(MalformedMessage {
                type_name,
                kind,
                header: header(),
                reason: e.to_string(),
            })),
        }
    }

    /// Registry key of the message, `None` for unrecognized types
    pub fn kind(&self) -> Option<MessageKind> {
        use OperationKind::*;
        let kind = match self {
            Message::IdentifyPillarsForGetFileRequest(_) => MessageKind::identify(GetFile),
            Message::GetFileRequest(_) => MessageKind::perform(GetFile),
            Message::IdentifyPillarsForGetFileIDsRequest(_) => MessageKind::identify(GetFileIds),
            Message::GetFileIDsRequest(_) => MessageKind::perform(GetFileIds),
            Message::IdentifyPillarsForGetChecksumsRequest(_) => MessageKind::identify(GetChecksums),
            Message::GetChecksumsRequest(_) => MessageKind::perform(GetChecksums),
            Message::IdentifyPillarsForGetFileInfosRequest(_) => MessageKind::identify(GetFileInfos),
            Message::GetFileInfosRequest(_) => MessageKind::perform(GetFileInfos),
            Message::IdentifyPillarsForPutFileRequest(_) => MessageKind::identify(PutFile),
            Message::PutFileRequest(_) => MessageKind::perform(PutFile),
            Message::IdentifyPillarsForDeleteFileRequest(_) => MessageKind::identify(DeleteFile),
            Message::DeleteFileRequest(_) => MessageKind::perform(DeleteFile),
            Message::IdentifyPillarsForReplaceFileRequest(_) => MessageKind::identify(ReplaceFile),
            Message::ReplaceFileRequest(_) => MessageKind::perform(ReplaceFile),
            Message::IdentifyContributorsForGetStatusRequest(_) => MessageKind::identify(GetStatus),
            Message::GetStatusRequest(_) => MessageKind::perform(GetStatus),
            Message::IdentifyContributorsForGetAuditTrailsRequest(_) => {
                MessageKind::identify(GetAuditTrails)
            }
            Message::GetAuditTrailsRequest(_) => MessageKind::perform(GetAuditTrails),
            Message::Malformed(malformed) => malformed.kind,
            Message::Unrecognized(_) => return None,
        };
        Some(kind)
    }

    pub fn header(&self) -> Option<&MessageHeader> {
        match self {
            Message::IdentifyPillarsForGetFileRequest(r) => Some(r.header()),
            Message::GetFileRequest(r) => Some(r.header()),
            Message::IdentifyPillarsForGetFileIDsRequest(r) => Some(r.header()),
            Message::GetFileIDsRequest(r) => Some(r.header()),
            Message::IdentifyPillarsForGetChecksumsRequest(r) => Some(r.header()),
            Message::GetChecksumsRequest(r) => Some(r.header()),
            Message::IdentifyPillarsForGetFileInfosRequest(r) => Some(r.header()),
            Message::GetFileInfosRequest(r) => Some(r.header()),
            Message::IdentifyPillarsForPutFileRequest(r) => Some(r.header()),
            Message::PutFileRequest(r) => Some(r.header()),
            Message::IdentifyPillarsForDeleteFileRequest(r) => Some(r.header()),
            Message::DeleteFileRequest(r) => Some(r.header()),
            Message::IdentifyPillarsForReplaceFileRequest(r) => Some(r.header()),
            Message::ReplaceFileRequest(r) => Some(r.header()),
            Message::IdentifyContributorsForGetStatusRequest(r) => Some(r.header()),
            Message::GetStatusRequest(r) => Some(r.header()),
            Message::IdentifyContributorsForGetAuditTrailsRequest(r) => Some(r.header()),
            Message::GetAuditTrailsRequest(r) => Some(r.header()),
            Message::Unrecognized(unknown) => unknown.header.as_ref(),
            Message::Malformed(malformed) => malformed.header.as_ref(),
        }
    }

    /// Name of the message type, as carried in the `type` field
    pub fn type_name(&self) -> &str {
        match self {
            Message::IdentifyPillarsForGetFileRequest(_) => "IdentifyPillarsForGetFileRequest",
            Message::GetFileRequest(_) => "GetFileRequest",
            Message::IdentifyPillarsForGetFileIDsRequest(_) => "IdentifyPillarsForGetFileIDsRequest",
            Message::GetFileIDsRequest(_) => "GetFileIDsRequest",
            Message::IdentifyPillarsForGetChecksumsRequest(_) => {
                "IdentifyPillarsForGetChecksumsRequest"
            }
            Message::GetChecksumsRequest(_) => "GetChecksumsRequest",
            Message::IdentifyPillarsForGetFileInfosRequest(_) => {
                "IdentifyPillarsForGetFileInfosRequest"
            }
            Message::GetFileInfosRequest(_) => "GetFileInfosRequest",
            Message::IdentifyPillarsForPutFileRequest(_) => "IdentifyPillarsForPutFileRequest",
            Message::PutFileRequest(_) => "PutFileRequest",
            Message::IdentifyPillarsForDeleteFileRequest(_) => "IdentifyPillarsForDeleteFileRequest",
            Message::DeleteFileRequest(_) => "DeleteFileRequest",
            Message::IdentifyPillarsForReplaceFileRequest(_) => {
                "IdentifyPillarsForReplaceFileRequest"
            }
            Message::ReplaceFileRequest(_) => "ReplaceFileRequest",
            Message::IdentifyContributorsForGetStatusRequest(_) => {
                "IdentifyContributorsForGetStatusRequest"
            }
            Message::GetStatusRequest(_) => "GetStatusRequest",
            Message::IdentifyContributorsForGetAuditTrailsRequest(_) => {
                "IdentifyContributorsForGetAuditTrailsRequest"
            }
            Message::GetAuditTrailsRequest(_) => "GetAuditTrailsRequest",
            Message::Unrecognized(unknown) => &unknown.kind,
            Message::Malformed(malformed) => &malformed.type_name,
        }
    }

    /// The single file the message is about, if any
    pub fn file_id(&self) -> Option<&str> {
        match self {
            Message::IdentifyPillarsForGetFileRequest(r) => r.file_id(),
            Message::GetFileRequest(r) => r.file_id(),
            Message::IdentifyPillarsForGetFileIDsRequest(r) => r.file_id(),
            Message::GetFileIDsRequest(r) => r.file_id(),
            Message::IdentifyPillarsForGetChecksumsRequest(r) => r.file_id(),
            Message::GetChecksumsRequest(r) => r.file_id(),
            Message::IdentifyPillarsForGetFileInfosRequest(r) => r.file_id(),
            Message::GetFileInfosRequest(r) => r.file_id(),
            Message::IdentifyPillarsForPutFileRequest(r) => r.file_id(),
            Message::PutFileRequest(r) => r.file_id(),
            Message::IdentifyPillarsForDeleteFileRequest(r) => r.file_id(),
            Message::DeleteFileRequest(r) => r.file_id(),
            Message::IdentifyPillarsForReplaceFileRequest(r) => r.file_id(),
            Message::ReplaceFileRequest(r) => r.file_id(),
            Message::IdentifyContributorsForGetStatusRequest(r) => r.file_id(),
            Message::GetStatusRequest(r) => r.file_id(),
            Message::IdentifyContributorsForGetAuditTrailsRequest(r) => r.file_id(),
            Message::GetAuditTrailsRequest(r) => r.file_id(),
            Message::Unrecognized(_) | Message::Malformed(_) => None,
        }
    }
}

/// Which step of a conversation a response belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStage {
    Identify,
    Progress,
    Final,
}

/// Operation-specific content of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponsePayload {
    Empty,
    Identification {
        time_to_deliver: TimeMeasure,
    },
    FileDelivery {
        file_address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_part: Option<FilePart>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum_data: Option<ChecksumData>,
    },
    Checksum {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum_data: Option<ChecksumData>,
    },
    Replace {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum_for_existing_file: Option<ChecksumData>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum_for_new_file: Option<ChecksumData>,
    },
    Checksums {
        checksum_spec: ChecksumSpec,
        delivery: Delivery<ChecksumDataItem>,
        partial_result: bool,
    },
    FileIds {
        delivery: Delivery<FileIdsDataItem>,
        partial_result: bool,
    },
    FileInfos {
        checksum_spec: ChecksumSpec,
        delivery: Delivery<FileInfosDataItem>,
        partial_result: bool,
    },
    Status {
        status: ResultingStatus,
    },
    AuditTrails {
        delivery: Delivery<AuditTrailEvent>,
    },
}

/// Outbound response to one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub correlation_id: String,
    pub collection_id: String,
    /// This pillar
    pub from: String,
    /// The requester's reply destination
    pub to: String,
    /// Where the requester may answer this pillar
    pub reply_to: String,
    pub version: u32,
    pub min_version: u32,
    pub operation: OperationKind,
    pub stage: ResponseStage,
    pub response_info: ResponseInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub payload: ResponsePayload,
}
