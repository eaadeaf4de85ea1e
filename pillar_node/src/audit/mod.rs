// Audit trail recording
//
// Every inbound message leaves exactly one audit event. Events are numbered
// with a monotonically increasing sequence number so that collectors can
// fetch them incrementally through GetAuditTrails.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// What happened to the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileAction {
    GetFile,
    PutFile,
    DeleteFile,
    ReplaceFile,
    GetChecksums,
    GetFileIds,
    GetFileInfos,
    GetStatus,
    GetAuditTrails,
    /// The request was refused or failed
    Failure,
    /// Anything not tied to one operation, such as unhandled messages
    Other,
}

/// Input for one audit event
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub collection_id: String,
    pub file_id: Option<String>,
    pub actor: String,
    pub description: String,
    pub audit_trail_information: Option<String>,
    pub action: FileAction,
    pub correlation_id: Option<String>,
}

/// A stored audit event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrailEvent {
    pub sequence_number: u64,
    pub collection_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub actor_on_file: String,
    pub action_on_file: FileAction,
    pub action_date_time: DateTime<Utc>,
    pub action_details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_trail_information: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub reporting_component: String,
}

/// Filter for audit trail queries. Unset bounds do not restrict.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub collection_id: Option<String>,
    pub file_id: Option<String>,
    pub min_sequence_number: Option<u64>,
    pub max_sequence_number: Option<u64>,
    pub min_timestamp: Option<DateTime<Utc>>,
    pub max_timestamp: Option<DateTime<Utc>>,
}

impl AuditQuery {
    pub fn matches(&self, event: &AuditTrailEvent) -> bool {
        let collection_ok = self
            .collection_id
            .as_ref()
            .map_or(true, |c| *c == event.collection_id);
        let file_ok = self
            .file_id
            .as_ref()
            .map_or(true, |f| event.file_id.as_deref() == Some(f.as_str()));
        let seq_ok = self.min_sequence_number.map_or(true, |min| event.sequence_number >= min)
            && self.max_sequence_number.map_or(true, |max| event.sequence_number <= max);
        let time_ok = self.min_timestamp.map_or(true, |min| event.action_date_time >= min)
            && self.max_timestamp.map_or(true, |max| event.action_date_time <= max);
        collection_ok && file_ok && seq_ok && time_ok
    }
}

/// Audit trail collaborator
#[async_trait]
pub trait AuditTrailManager: Send + Sync {
    /// Records an event. Recording never fails the protocol; implementations
    /// log their own problems.
    async fn record(&self, record: AuditRecord);

    /// Returns the events matching `query`, ordered by sequence number.
    async fn get_audits(&self, query: &AuditQuery) -> Result<Vec<AuditTrailEvent>>;
}

/// In-memory audit trail
pub struct MemoryAuditTrail {
    reporting_component: String,
    events: RwLock<Vec<AuditTrailEvent>>,
    next_sequence: AtomicU64,
}

impl MemoryAuditTrail {
    pub fn new(reporting_component: impl Into<String>) -> Self {
        Self {
            reporting_component: reporting_component.into(),
            events: RwLock::new(Vec::new()),
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn events(&self) -> Vec<AuditTrailEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl AuditTrailManager for MemoryAuditTrail {
    async fn record(&self, record: AuditRecord) {
        let sequence_number = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Audit #{}: {:?} on {:?} by {}",
            sequence_number, record.action, record.file_id, record.actor
        );
        let event = AuditTrailEvent {
            sequence_number,
            collection_id: record.collection_id,
            file_id: record.file_id,
            actor_on_file: record.actor,
            action_on_file: record.action,
            action_date_time: Utc::now(),
            action_details: record.description,
            audit_trail_information: record.audit_trail_information,
            correlation_id: record.correlation_id,
            reporting_component: self.reporting_component.clone(),
        };
        self.events.write().push(event);
    }

    async fn get_audits(&self, query: &AuditQuery) -> Result<Vec<AuditTrailEvent>> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|event| query.matches(event))
            .cloned()
            .collect())
    }
}
