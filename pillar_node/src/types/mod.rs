// Protocol types shared by every component of the pillar
//
// Response codes, checksum specifications, file selectors and the result
// records delivered by enumeration operations. The request and response
// envelopes live in the `messages` submodule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod messages;

/// Outcome code attached to every response.
///
/// The codes are mutually exclusive per conversation. `REQUEST_ACCEPTED` and
/// `SUCCESS` are accepted on the wire as aliases of the progress and
/// completion codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    IdentificationPositive,
    IdentificationNegative,
    #[serde(alias = "REQUEST_ACCEPTED")]
    OperationAcceptedProgress,
    #[serde(alias = "SUCCESS")]
    OperationCompleted,
    Failure,
    RequestNotUnderstoodFailure,
    RequestNotSupported,
    FileNotFoundFailure,
    DuplicateFileFailure,
    ExistingFileChecksumFailure,
    NewFileChecksumFailure,
    FileTransferFailure,
    OperationFailed,
}

impl ResponseCode {
    pub const REQUEST_ACCEPTED: ResponseCode = ResponseCode::OperationAcceptedProgress;
    pub const SUCCESS: ResponseCode = ResponseCode::OperationCompleted;

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseCode::IdentificationPositive => "IDENTIFICATION_POSITIVE",
            ResponseCode::IdentificationNegative => "IDENTIFICATION_NEGATIVE",
            ResponseCode::OperationAcceptedProgress => "OPERATION_ACCEPTED_PROGRESS",
            ResponseCode::OperationCompleted => "OPERATION_COMPLETED",
            ResponseCode::Failure => "FAILURE",
            ResponseCode::RequestNotUnderstoodFailure => "REQUEST_NOT_UNDERSTOOD_FAILURE",
            ResponseCode::RequestNotSupported => "REQUEST_NOT_SUPPORTED",
            ResponseCode::FileNotFoundFailure => "FILE_NOT_FOUND_FAILURE",
            ResponseCode::DuplicateFileFailure => "DUPLICATE_FILE_FAILURE",
            ResponseCode::ExistingFileChecksumFailure => "EXISTING_FILE_CHECKSUM_FAILURE",
            ResponseCode::NewFileChecksumFailure => "NEW_FILE_CHECKSUM_FAILURE",
            ResponseCode::FileTransferFailure => "FILE_TRANSFER_FAILURE",
            ResponseCode::OperationFailed => "OPERATION_FAILED",
        }
    }

    /// Whether the code concludes a conversation negatively
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            ResponseCode::IdentificationPositive
                | ResponseCode::OperationAcceptedProgress
                | ResponseCode::OperationCompleted
        )
    }

    /// Whether the code reports a checksum problem, which is alarmed with
    /// the checksum alarm code.
    pub fn is_checksum_failure(&self) -> bool {
        matches!(
            self,
            ResponseCode::ExistingFileChecksumFailure | ResponseCode::NewFileChecksumFailure
        )
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response code plus free text explaining it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub response_code: ResponseCode,
    pub response_text: String,
}

impl ResponseInfo {
    pub fn new(response_code: ResponseCode, response_text: impl Into<String>) -> Self {
        Self {
            response_code,
            response_text: response_text.into(),
        }
    }
}

/// Digest algorithm named by a checksum specification.
///
/// Unknown names decode into `Unrecognized` instead of failing the whole
/// message, so the request can still be answered with a proper response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    HmacMd5,
    HmacSha1,
    HmacSha256,
    HmacSha384,
    HmacSha512,
    Other,
    Unrecognized(String),
}

impl ChecksumType {
    pub fn as_str(&self) -> &str {
        match self {
            ChecksumType::Md5 => "MD5",
            ChecksumType::Sha1 => "SHA1",
            ChecksumType::Sha256 => "SHA256",
            ChecksumType::Sha384 => "SHA384",
            ChecksumType::Sha512 => "SHA512",
            ChecksumType::HmacMd5 => "HMAC_MD5",
            ChecksumType::HmacSha1 => "HMAC_SHA1",
            ChecksumType::HmacSha256 => "HMAC_SHA256",
            ChecksumType::HmacSha384 => "HMAC_SHA384",
            ChecksumType::HmacSha512 => "HMAC_SHA512",
            ChecksumType::Other => "OTHER",
            ChecksumType::Unrecognized(name) => name,
        }
    }
}

impl From<String> for ChecksumType {
    /// Separators are ignored, so `SHA-256`, `hmac_sha256` and `HMAC-SHA256`
    /// all resolve.
    fn from(name: String) -> Self {
        let compact: String = name
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .collect::<String>()
            .to_ascii_uppercase();
        match compact.as_str() {
            "MD5" => ChecksumType::Md5,
            "SHA1" => ChecksumType::Sha1,
            "SHA256" => ChecksumType::Sha256,
            "SHA384" => ChecksumType::Sha384,
            "SHA512" => ChecksumType::Sha512,
            "HMACMD5" => ChecksumType::HmacMd5,
            "HMACSHA1" => ChecksumType::HmacSha1,
            "HMACSHA256" => ChecksumType::HmacSha256,
            "HMACSHA384" => ChecksumType::HmacSha384,
            "HMACSHA512" => ChecksumType::HmacSha512,
            "OTHER" => ChecksumType::Other,
            _ => ChecksumType::Unrecognized(name),
        }
    }
}

impl From<&str> for ChecksumType {
    fn from(name: &str) -> Self {
        ChecksumType::from(name.to_string())
    }
}

impl From<ChecksumType> for String {
    fn from(checksum_type: ChecksumType) -> Self {
        checksum_type.as_str().to_string()
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a checksum is computed: algorithm plus optional salt.
///
/// When `checksum_type` is `OTHER`, `other_checksum_type` names the actual
/// algorithm. The salt is carried base64 encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChecksumSpec {
    pub checksum_type: ChecksumType,
    #[serde(
        default,
        with = "base64_salt",
        skip_serializing_if = "Option::is_none"
    )]
    pub checksum_salt: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_checksum_type: Option<String>,
}

impl ChecksumSpec {
    pub fn new(checksum_type: ChecksumType) -> Self {
        Self {
            checksum_type,
            checksum_salt: None,
            other_checksum_type: None,
        }
    }

    pub fn with_salt(checksum_type: ChecksumType, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            checksum_type,
            checksum_salt: Some(salt.into()),
            other_checksum_type: None,
        }
    }

    pub fn other(name: impl Into<String>) -> Self {
        Self {
            checksum_type: ChecksumType::Other,
            checksum_salt: None,
            other_checksum_type: Some(name.into()),
        }
    }
}

impl fmt::Display for ChecksumSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.checksum_type, &self.other_checksum_type) {
            (ChecksumType::Other, Some(other)) => write!(f, "OTHER({})", other)?,
            (checksum_type, _) => write!(f, "{}", checksum_type)?,
        }
        if self.checksum_salt.is_some() {
            f.write_str(" (salted)")?;
        }
        Ok(())
    }
}

mod base64_salt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(salt: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match salt {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|value| STANDARD.decode(value).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// A checksum value together with the spec that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumData {
    pub checksum_spec: ChecksumSpec,
    /// Lowercase hex digest
    pub checksum_value: String,
    #[serde(default = "Utc::now")]
    pub calculation_timestamp: DateTime<Utc>,
}

/// Selects either one named file or every file in the collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileIds {
    AllFileIds,
    FileId(String),
}

impl FileIds {
    pub fn file_id(&self) -> Option<&str> {
        match self {
            FileIds::AllFileIds => None,
            FileIds::FileId(id) => Some(id),
        }
    }
}

/// Byte range of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePart {
    pub part_offset: u64,
    pub part_length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeMeasureUnit {
    Milliseconds,
    Hours,
}

/// Estimated time before a pillar can start delivering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeMeasure {
    pub time_measure_value: u64,
    pub time_measure_unit: TimeMeasureUnit,
}

impl TimeMeasure {
    pub fn from_millis(millis: u64) -> Self {
        Self {
            time_measure_value: millis,
            time_measure_unit: TimeMeasureUnit::Milliseconds,
        }
    }

    /// The largest representable time, meaning "do not pick this pillar"
    pub fn maximum() -> Self {
        Self {
            time_measure_value: u64::MAX,
            time_measure_unit: TimeMeasureUnit::Hours,
        }
    }

    pub fn is_maximum(&self) -> bool {
        *self == Self::maximum()
    }
}

/// Severity threshold governing which failures are escalated to alarms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmLevel {
    Warning,
    #[default]
    Error,
    Emergency,
}

/// One checksum record in a GetChecksums result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumDataItem {
    pub file_id: String,
    pub checksum_value: String,
    pub calculation_timestamp: DateTime<Utc>,
}

/// One record in a GetFileIDs result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIdsDataItem {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    pub last_modification_time: DateTime<Utc>,
}

/// One record in a GetFileInfos result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfosDataItem {
    pub file_id: String,
    pub checksum_value: String,
    pub calculation_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modification_time: Option<DateTime<Utc>>,
}

/// An ordered, possibly truncated, enumeration result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet<T> {
    pub entries: Vec<T>,
    pub partial_result: bool,
}

impl<T> ResultSet<T> {
    /// Keeps at most `max_results` entries, flagging the set as partial when
    /// more were available.
    pub fn bounded(mut entries: Vec<T>, max_results: Option<u64>) -> Self {
        let limit = max_results
            .map(|max| usize::try_from(max).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        let partial_result = entries.len() > limit;
        entries.truncate(limit);
        Self {
            entries,
            partial_result,
        }
    }
}

/// How a result set reaches the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery<T> {
    Inline { entries: Vec<T> },
    ResultAddress { address: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    Failure,
}

/// Status reported by GetStatus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultingStatus {
    pub status_code: StatusCode,
    pub status_text: String,
    pub status_timestamp: DateTime<Utc>,
}
