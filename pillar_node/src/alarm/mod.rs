// Alarm escalation
//
// Handlers never raise alarms directly. Failures caught at the handler
// boundary are passed to the `AlarmPolicy`, which compares the failure class
// with the configured alarm level and forwards the alarm to the dispatcher
// when it is escalated.

use crate::bus::{MessageBus, OutboundMessage};
use crate::types::{AlarmLevel, ResponseInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmCode {
    /// Malformed or misaddressed request
    InconsistentRequest,
    /// Unexpected internal failure
    ComponentFailure,
    /// Checksum mismatch or missing mandatory checksum
    ChecksumAlarm,
    /// Request refused for another operational reason
    FailedOperation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub alarm_code: AlarmCode,
    pub alarm_text: String,
    /// Component raising the alarm
    pub alarm_raiser: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub orig_date_time: DateTime<Utc>,
}

/// Receives escalated alarms
#[async_trait]
pub trait AlarmDispatcher: Send + Sync {
    /// Delivers an alarm. Delivery problems are logged, never returned.
    async fn send_alarm(&self, alarm: Alarm);
}

/// Sends alarms over the message bus
pub struct BusAlarmDispatcher {
    bus: Arc<dyn MessageBus>,
}

impl BusAlarmDispatcher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl AlarmDispatcher for BusAlarmDispatcher {
    async fn send_alarm(&self, alarm: Alarm) {
        if let Err(e) = self.bus.send(OutboundMessage::Alarm(alarm)).await {
            error!("Failed to send alarm: {}", e);
        }
    }
}

/// Keeps every alarm in memory, for inspection by tests and tooling
#[derive(Default)]
pub struct RecordingAlarmDispatcher {
    alarms: Mutex<Vec<Alarm>>,
}

impl RecordingAlarmDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alarms(&self) -> Vec<Alarm> {
        self.alarms.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.alarms.lock().len()
    }
}

#[async_trait]
impl AlarmDispatcher for RecordingAlarmDispatcher {
    async fn send_alarm(&self, alarm: Alarm) {
        info!("Alarm recorded: {:?} {}", alarm.alarm_code, alarm.alarm_text);
        self.alarms.lock().push(alarm);
    }
}

/// Decides whether a caught failure is escalated to an alarm.
///
/// | failure class      | escalated when          |
/// |--------------------|-------------------------|
/// | illegal argument   | level == WARNING        |
/// | unhandled message  | level == WARNING        |
/// | illegal operation  | level != EMERGENCY      |
/// | internal failure   | level != EMERGENCY      |
#[derive(Clone)]
pub struct AlarmPolicy {
    level: AlarmLevel,
    raiser: String,
    dispatcher: Arc<dyn AlarmDispatcher>,
}

impl AlarmPolicy {
    pub fn new(level: AlarmLevel, raiser: impl Into<String>, dispatcher: Arc<dyn AlarmDispatcher>) -> Self {
        Self {
            level,
            raiser: raiser.into(),
            dispatcher,
        }
    }

    pub fn level(&self) -> AlarmLevel {
        self.level
    }

    pub fn escalates_illegal_argument(&self) -> bool {
        self.level == AlarmLevel::Warning
    }

    pub fn escalates_internal_failure(&self) -> bool {
        self.level != AlarmLevel::Emergency
    }

    pub async fn handle_illegal_argument(&self, collection_id: Option<&str>, text: &str) {
        if !self.escalates_illegal_argument() {
            warn!("Illegal argument not escalated at level {:?}: {}", self.level, text);
            return;
        }
        self.raise(AlarmCode::InconsistentRequest, text.to_string(), collection_id, None)
            .await;
    }

    pub async fn handle_unhandled_message(&self, collection_id: Option<&str>, message_type: &str) {
        let text = format!("Received unhandled message of type '{}'", message_type);
        if !self.escalates_illegal_argument() {
            warn!("{}", text);
            return;
        }
        self.raise(AlarmCode::InconsistentRequest, text, collection_id, None)
            .await;
    }

    pub async fn handle_illegal_operation(
        &self,
        collection_id: Option<&str>,
        file_id: Option<&str>,
        info: &ResponseInfo,
    ) {
        if !self.escalates_internal_failure() {
            warn!("Illegal operation not escalated: {}", info.response_text);
            return;
        }
        let code = if info.response_code.is_checksum_failure() {
            AlarmCode::ChecksumAlarm
        } else {
            AlarmCode::FailedOperation
        };
        self.raise(
            code,
            format!("{}: {}", info.response_code, info.response_text),
            collection_id,
            file_id,
        )
        .await;
    }

    pub async fn handle_internal_failure(&self, collection_id: Option<&str>, text: &str) {
        if !self.escalates_internal_failure() {
            warn!("Internal failure not escalated: {}", text);
            return;
        }
        self.raise(AlarmCode::ComponentFailure, text.to_string(), collection_id, None)
            .await;
    }

    async fn raise(
        &self,
        alarm_code: AlarmCode,
        alarm_text: String,
        collection_id: Option<&str>,
        file_id: Option<&str>,
    ) {
        warn!("Raising {:?} alarm: {}", alarm_code, alarm_text);
        self.dispatcher
            .send_alarm(Alarm {
                alarm_code,
                alarm_text,
                alarm_raiser: self.raiser.clone(),
                collection_id: collection_id.map(str::to_owned),
                file_id: file_id.map(str::to_owned),
                orig_date_time: Utc::now(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseCode;

    fn policy(level: AlarmLevel) -> (AlarmPolicy, Arc<RecordingAlarmDispatcher>) {
        let recorder = Arc::new(RecordingAlarmDispatcher::new());
        (AlarmPolicy::new(level, "pillar-1", recorder.clone()), recorder)
    }

    #[tokio::test]
    async fn test_illegal_argument_only_alarms_at_warning() {
        for (level, expected) in [
            (AlarmLevel::Warning, 1),
            (AlarmLevel::Error, 0),
            (AlarmLevel::Emergency, 0),
        ] {
            let (policy, recorder) = policy(level);
            policy.handle_illegal_argument(Some("books"), "wrong pillar").await;
            assert_eq!(recorder.count(), expected, "level {:?}", level);
        }
    }

    #[tokio::test]
    async fn test_internal_failure_alarms_below_emergency() {
        for (level, expected) in [
            (AlarmLevel::Warning, 1),
            (AlarmLevel::Error, 1),
            (AlarmLevel::Emergency, 0),
        ] {
            let (policy, recorder) = policy(level);
            policy.handle_internal_failure(None, "disk on fire").await;
            assert_eq!(recorder.count(), expected, "level {:?}", level);
        }
    }

    #[tokio::test]
    async fn test_checksum_failures_use_checksum_alarm_code() {
        let (policy, recorder) = policy(AlarmLevel::Error);
        let info = ResponseInfo::new(ResponseCode::ExistingFileChecksumFailure, "mismatch");
        policy
            .handle_illegal_operation(Some("books"), Some("file1"), &info)
            .await;

        let alarms = recorder.alarms();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].alarm_code, AlarmCode::ChecksumAlarm);
        assert_eq!(alarms[0].file_id.as_deref(), Some("file1"));
        assert_eq!(alarms[0].alarm_raiser, "pillar-1");
    }
}
