// Checksum validation and calculation
//
// Decides which checksum specs this pillar can honour, computes digests over
// file content and compares claimed checksums against the stored bytes.

use crate::error::{HandlerResult, PillarError, RequestHandlerError, Result};
use crate::types::{ChecksumData, ChecksumSpec, ChecksumType, ResponseCode};
use chrono::Utc;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Size of the chunks file content is digested in
const READ_CHUNK_SIZE: usize = 4096;

/// Digest algorithms this pillar can instantiate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
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
}

impl ChecksumAlgorithm {
    pub fn is_hmac(&self) -> bool {
        matches!(
            self,
            ChecksumAlgorithm::HmacMd5
                | ChecksumAlgorithm::HmacSha1
                | ChecksumAlgorithm::HmacSha256
                | ChecksumAlgorithm::HmacSha384
                | ChecksumAlgorithm::HmacSha512
        )
    }

    fn from_type(checksum_type: &ChecksumType) -> Option<Self> {
        match checksum_type {
            ChecksumType::Md5 => Some(ChecksumAlgorithm::Md5),
            ChecksumType::Sha1 => Some(ChecksumAlgorithm::Sha1),
            ChecksumType::Sha256 => Some(ChecksumAlgorithm::Sha256),
            ChecksumType::Sha384 => Some(ChecksumAlgorithm::Sha384),
            ChecksumType::Sha512 => Some(ChecksumAlgorithm::Sha512),
            ChecksumType::HmacMd5 => Some(ChecksumAlgorithm::HmacMd5),
            ChecksumType::HmacSha1 => Some(ChecksumAlgorithm::HmacSha1),
            ChecksumType::HmacSha256 => Some(ChecksumAlgorithm::HmacSha256),
            ChecksumType::HmacSha384 => Some(ChecksumAlgorithm::HmacSha384),
            ChecksumType::HmacSha512 => Some(ChecksumAlgorithm::HmacSha512),
            ChecksumType::Other | ChecksumType::Unrecognized(_) => None,
        }
    }

    /// Resolves the algorithm a spec names, checking the salt fits it.
    pub fn resolve(spec: &ChecksumSpec) -> std::result::Result<Self, String> {
        let algorithm = match &spec.checksum_type {
            ChecksumType::Other => {
                let name = spec
                    .other_checksum_type
                    .as_deref()
                    .ok_or_else(|| "Checksum type OTHER without a named algorithm".to_string())?;
                let named = ChecksumType::from(name);
                if named == ChecksumType::Other {
                    return Err(format!("Unsupported checksum algorithm: OTHER({})", name));
                }
                Self::from_type(&named)
                    .ok_or_else(|| format!("Unsupported checksum algorithm: OTHER({})", name))?
            }
            other => Self::from_type(other)
                .ok_or_else(|| format!("Unsupported checksum algorithm: {}", other))?,
        };

        let salted = spec
            .checksum_salt
            .as_ref()
            .map(|salt| !salt.is_empty())
            .unwrap_or(false);
        match (algorithm.is_hmac(), salted) {
            (true, false) => Err(format!(
                "Checksum algorithm {} requires a salt",
                spec.checksum_type
            )),
            (false, true) => Err(format!(
                "Checksum algorithm {} cannot be salted",
                spec.checksum_type
            )),
            _ => Ok(algorithm),
        }
    }
}

enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    HmacMd5(Hmac<Md5>),
    HmacSha1(Hmac<Sha1>),
    HmacSha256(Hmac<Sha256>),
    HmacSha384(Hmac<Sha384>),
    HmacSha512(Hmac<Sha512>),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm, salt: &[u8]) -> Result<Self> {
        let invalid_key = |e: hmac::digest::InvalidLength| {
            PillarError::Checksum(format!("Invalid HMAC key: {}", e))
        };
        Ok(match algorithm {
            ChecksumAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            ChecksumAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha384 => Hasher::Sha384(Sha384::new()),
            ChecksumAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            ChecksumAlgorithm::HmacMd5 => {
                Hasher::HmacMd5(Hmac::<Md5>::new_from_slice(salt).map_err(invalid_key)?)
            }
            ChecksumAlgorithm::HmacSha1 => {
                Hasher::HmacSha1(Hmac::<Sha1>::new_from_slice(salt).map_err(invalid_key)?)
            }
            ChecksumAlgorithm::HmacSha256 => {
                Hasher::HmacSha256(Hmac::<Sha256>::new_from_slice(salt).map_err(invalid_key)?)
            }
            ChecksumAlgorithm::HmacSha384 => {
                Hasher::HmacSha384(Hmac::<Sha384>::new_from_slice(salt).map_err(invalid_key)?)
            }
            ChecksumAlgorithm::HmacSha512 => {
                Hasher::HmacSha512(Hmac::<Sha512>::new_from_slice(salt).map_err(invalid_key)?)
            }
        })
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Hasher::Md5(h) => Digest::update(h, chunk),
            Hasher::Sha1(h) => Digest::update(h, chunk),
            Hasher::Sha256(h) => Digest::update(h, chunk),
            Hasher::Sha384(h) => Digest::update(h, chunk),
            Hasher::Sha512(h) => Digest::update(h, chunk),
            Hasher::HmacMd5(m) => Mac::update(m, chunk),
            Hasher::HmacSha1(m) => Mac::update(m, chunk),
            Hasher::HmacSha256(m) => Mac::update(m, chunk),
            Hasher::HmacSha384(m) => Mac::update(m, chunk),
            Hasher::HmacSha512(m) => Mac::update(m, chunk),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha384(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::HmacMd5(m) => hex::encode(m.finalize().into_bytes()),
            Hasher::HmacSha1(m) => hex::encode(m.finalize().into_bytes()),
            Hasher::HmacSha256(m) => hex::encode(m.finalize().into_bytes()),
            Hasher::HmacSha384(m) => hex::encode(m.finalize().into_bytes()),
            Hasher::HmacSha512(m) => hex::encode(m.finalize().into_bytes()),
        }
    }
}

/// Stateless checksum validator shared by every handler
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumValidator;

impl ChecksumValidator {
    pub fn new() -> Self {
        Self
    }

    /// Checks that a requested checksum spec can be computed here.
    ///
    /// An absent spec is accepted unless `mandatory` is set. Both failures
    /// are answered with REQUEST_NOT_UNDERSTOOD_FAILURE.
    pub fn verify_algorithm_supported(
        &self,
        spec: Option<&ChecksumSpec>,
        mandatory: bool,
    ) -> HandlerResult<()> {
        match spec {
            None if mandatory => Err(RequestHandlerError::invalid_message(
                ResponseCode::RequestNotUnderstoodFailure,
                "A checksum specification is required for this request",
            )),
            None => Ok(()),
            Some(spec) => ChecksumAlgorithm::resolve(spec).map(|_| ()).map_err(|reason| {
                debug!("Rejecting checksum spec {}: {}", spec, reason);
                RequestHandlerError::invalid_message(
                    ResponseCode::RequestNotUnderstoodFailure,
                    reason,
                )
            }),
        }
    }

    /// Computes the checksum of everything `reader` yields.
    pub async fn compute<R>(&self, mut reader: R, spec: &ChecksumSpec) -> Result<ChecksumData>
    where
        R: AsyncRead + Unpin + Send,
    {
        let algorithm = ChecksumAlgorithm::resolve(spec).map_err(PillarError::Checksum)?;
        let salt = spec.checksum_salt.as_deref().unwrap_or_default();
        let mut hasher = Hasher::new(algorithm, salt)?;

        let mut buffer = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(ChecksumData {
            checksum_spec: spec.clone(),
            checksum_value: hasher.finalize_hex(),
            calculation_timestamp: Utc::now(),
        })
    }

    /// Computes the checksum of an in-memory buffer.
    pub async fn compute_bytes(&self, data: &[u8], spec: &ChecksumSpec) -> Result<ChecksumData> {
        self.compute(data, spec).await
    }

    /// Recomputes the checksum of `reader` with the claimed spec and compares
    /// it with the claimed value.
    ///
    /// On mismatch the computed value is logged here and nowhere else; the
    /// caller only learns that the values differ.
    pub async fn verify_matches<R>(&self, claimed: &ChecksumData, reader: R, file_id: &str) -> Result<bool>
    where
        R: AsyncRead + Unpin + Send,
    {
        let computed = self.compute(reader, &claimed.checksum_spec).await?;
        let matches = computed
            .checksum_value
            .eq_ignore_ascii_case(claimed.checksum_value.trim());
        if !matches {
            warn!(
                "Checksum mismatch for '{}' ({}): expected '{}', computed '{}'",
                file_id, claimed.checksum_spec, claimed.checksum_value, computed.checksum_value
            );
        }
        Ok(matches)
    }
}
