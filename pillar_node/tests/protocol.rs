// End-to-end conversations against an assembled pillar, driven through
// decoded JSON messages the way the HTTP ingress hands them over.

use pillar_node::alarm::{AlarmCode, RecordingAlarmDispatcher};
use pillar_node::audit::MemoryAuditTrail;
use pillar_node::bus::LocalMessageBus;
use pillar_node::config::{PillarConfig, PillarType};
use pillar_node::exchange::MemoryFileExchange;
use pillar_node::node::{Components, PillarNode};
use pillar_node::storage::{FileArchive, FileSystemArchive, MemoryArchive, MemoryChecksumStore};
use pillar_node::types::messages::{Message, ResponsePayload, ResponseStage};
use pillar_node::types::{AlarmLevel, ChecksumType, Delivery, ResponseCode};
use pillar_node::PillarMediator;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

struct Pillar {
    mediator: Arc<PillarMediator>,
    bus: Arc<LocalMessageBus>,
    exchange: Arc<MemoryFileExchange>,
    alarms: Arc<RecordingAlarmDispatcher>,
}

fn config(level: AlarmLevel) -> PillarConfig {
    let mut config = PillarConfig::default();
    config.pillar.pillar_id = "pillar-1".to_string();
    config.pillar.collection_ids = vec!["books".to_string()];
    config.pillar.alarm_level = level;
    config.pillar.min_size_left = 0;
    config
}

fn assemble(config: PillarConfig, archive: Arc<dyn FileArchive>) -> Pillar {
    let bus = Arc::new(LocalMessageBus::new());
    let exchange = Arc::new(MemoryFileExchange::new());
    let alarms = Arc::new(RecordingAlarmDispatcher::new());

    let node = PillarNode::assemble(
        config,
        archive,
        Arc::new(MemoryChecksumStore::new()),
        Components {
            bus: bus.clone(),
            exchange: exchange.clone(),
            alarms: alarms.clone(),
            audit: Arc::new(MemoryAuditTrail::new("pillar-1")),
        },
    )
    .unwrap();

    Pillar {
        mediator: node.mediator(),
        bus,
        exchange,
        alarms,
    }
}

fn pillar(level: AlarmLevel) -> (Pillar, Arc<MemoryArchive>) {
    let archive = Arc::new(MemoryArchive::new(1_000_000));
    (assemble(config(level), archive.clone()), archive)
}

fn message(kind: &str, correlation_id: &str, body: Value) -> Message {
    let mut value = json!({
        "type": kind,
        "correlation_id": correlation_id,
        "collection_id": "books",
        "from": "client-1",
        "reply_to": "http://client-1/replies",
    });
    if let (Some(target), Value::Object(fields)) = (value.as_object_mut(), body) {
        target.extend(fields);
    }
    Message::decode(value).unwrap()
}

fn md5(value: &str) -> Value {
    json!({"checksum_spec": {"checksum_type": "MD5"}, "checksum_value": value})
}

#[tokio::test]
async fn test_successful_put_sends_progress_then_final() {
    let (p, archive) = pillar(AlarmLevel::Error);
    p.exchange.insert("mem://in/file1", "hello");

    p.mediator
        .dispatch(message(
            "PutFileRequest",
            "put-1",
            json!({
                "pillar_id": "pillar-1",
                "file_id": "file1",
                "file_address": "mem://in/file1",
                "file_size": 5,
                "checksum_data_for_new_file": md5("5d41402abc4b2a76b9719d911017c592"),
            }),
        ))
        .await;

    let responses = p.bus.responses_for("put-1");
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].stage, ResponseStage::Progress);
    assert_eq!(
        responses[0].response_info.response_code,
        ResponseCode::OperationAcceptedProgress
    );
    assert_eq!(responses[1].stage, ResponseStage::Final);
    assert_eq!(
        responses[1].response_info.response_code,
        ResponseCode::OperationCompleted
    );
    assert_eq!(responses[1].to, "http://client-1/replies");
    assert_eq!(archive.content("books", "file1").unwrap(), "hello");
    assert_eq!(archive.staged_count(), 0);
}

#[tokio::test]
async fn test_duplicate_put_rejected_in_both_phases() {
    let (p, archive) = pillar(AlarmLevel::Error);
    archive.insert("books", "file1", "original");
    p.exchange.insert("mem://in/file1", "replacement");

    p.mediator
        .dispatch(message(
            "IdentifyPillarsForPutFileRequest",
            "dup-1",
            json!({"file_id": "file1"}),
        ))
        .await;
    let identify = p.bus.final_response("dup-1").unwrap();
    assert_eq!(identify.stage, ResponseStage::Identify);
    assert_eq!(
        identify.response_info.response_code,
        ResponseCode::DuplicateFileFailure
    );

    p.mediator
        .dispatch(message(
            "PutFileRequest",
            "dup-2",
            json!({
                "pillar_id": "pillar-1",
                "file_id": "file1",
                "file_address": "mem://in/file1",
            }),
        ))
        .await;
    let responses = p.bus.responses_for("dup-2");
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].response_info.response_code,
        ResponseCode::DuplicateFileFailure
    );
    assert_eq!(archive.content("books", "file1").unwrap(), "original");
}

#[tokio::test]
async fn test_delete_with_wrong_checksum_keeps_file() {
    let (p, archive) = pillar(AlarmLevel::Error);
    archive.insert("books", "file1", "");

    p.mediator
        .dispatch(message(
            "DeleteFileRequest",
            "del-1",
            json!({
                "pillar_id": "pillar-1",
                "file_id": "file1",
                "checksum_data_for_existing_file": md5("00000000000000000000000000000000"),
            }),
        ))
        .await;

    let response = p.bus.final_response("del-1").unwrap();
    assert_eq!(
        response.response_info.response_code,
        ResponseCode::ExistingFileChecksumFailure
    );
    assert!(!response.response_info.response_text.contains(EMPTY_MD5));
    assert!(archive.content("books", "file1").is_some());

    let alarms = p.alarms.alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].alarm_code, AlarmCode::ChecksumAlarm);
}

#[tokio::test]
async fn test_delete_returns_requested_checksum() {
    let (p, archive) = pillar(AlarmLevel::Error);
    archive.insert("books", "file1", "");

    p.mediator
        .dispatch(message(
            "DeleteFileRequest",
            "del-2",
            json!({
                "pillar_id": "pillar-1",
                "file_id": "file1",
                "checksum_data_for_existing_file": md5(EMPTY_MD5),
                "checksum_request_for_existing_file": {"checksum_type": "SHA384"},
            }),
        ))
        .await;

    let response = p.bus.final_response("del-2").unwrap();
    assert_eq!(response.response_info.response_code, ResponseCode::SUCCESS);
    assert!(archive.content("books", "file1").is_none());
    match response.payload {
        ResponsePayload::Checksum {
            checksum_data: Some(data),
        } => {
            assert_eq!(data.checksum_spec.checksum_type, ChecksumType::Sha384);
            assert_eq!(data.checksum_value.len(), 96);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_file_ids_paged_by_max_results() {
    let (p, archive) = pillar(AlarmLevel::Error);
    for i in 0..12 {
        archive
            .insert("books", &format!("file{:02}", i), format!("content {}", i));
    }

    let request = |correlation_id: &str, max: Option<u64>| {
        let mut body = json!({"pillar_id": "pillar-1", "file_ids": "all_file_ids"});
        if let Some(max) = max {
            body["max_number_of_results"] = json!(max);
        }
        message("GetFileIDsRequest", correlation_id, body)
    };

    p.mediator.dispatch(request("ids-1", Some(5))).await;
    p.mediator.dispatch(request("ids-2", None)).await;

    let count = |correlation_id: &str| match p.bus.final_response(correlation_id).unwrap().payload
    {
        ResponsePayload::FileIds {
            delivery: Delivery::Inline { entries },
            partial_result,
        } => (entries.len(), partial_result),
        other => panic!("unexpected payload: {:?}", other),
    };
    assert_eq!(count("ids-1"), (5, true));
    assert_eq!(count("ids-2"), (12, false));
}

#[tokio::test]
async fn test_identify_put_beyond_capacity() {
    let (p, _) = pillar(AlarmLevel::Error);

    p.mediator
        .dispatch(message(
            "IdentifyPillarsForPutFileRequest",
            "cap-1",
            json!({"file_id": "huge", "file_size": u64::MAX}),
        ))
        .await;

    let response = p.bus.final_response("cap-1").unwrap();
    assert_eq!(response.response_info.response_code, ResponseCode::Failure);
    match response.payload {
        ResponsePayload::Identification { time_to_deliver } => {
            assert!(time_to_deliver.is_maximum())
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_algorithm_rejected_before_transfer() {
    let (p, archive) = pillar(AlarmLevel::Error);
    p.exchange.insert("mem://in/file1", "hello");

    p.mediator
        .dispatch(message(
            "PutFileRequest",
            "alg-1",
            json!({
                "pillar_id": "pillar-1",
                "file_id": "file1",
                "file_address": "mem://in/file1",
                "checksum_request_for_new_file": {"checksum_type": "OTHER"},
            }),
        ))
        .await;

    let responses = p.bus.responses_for("alg-1");
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].response_info.response_code,
        ResponseCode::RequestNotUnderstoodFailure
    );
    assert!(archive.content("books", "file1").is_none());
}

#[tokio::test]
async fn test_wrong_pillar_alarms_only_at_warning() {
    let status_for_other_pillar = || {
        message(
            "GetStatusRequest",
            "st-1",
            json!({"contributor": "pillar-2"}),
        )
    };

    let (p, _) = pillar(AlarmLevel::Emergency);
    p.mediator.dispatch(status_for_other_pillar()).await;
    assert_eq!(p.alarms.count(), 0);
    assert_eq!(
        p.bus.final_response("st-1").unwrap().response_info.response_code,
        ResponseCode::RequestNotUnderstoodFailure
    );

    let (p, _) = pillar(AlarmLevel::Warning);
    p.mediator.dispatch(status_for_other_pillar()).await;
    assert_eq!(p.alarms.count(), 1);
    assert_eq!(p.alarms.alarms()[0].alarm_code, AlarmCode::InconsistentRequest);
}

#[tokio::test]
async fn test_concurrent_puts_of_same_file() {
    let (p, archive) = pillar(AlarmLevel::Error);
    p.exchange.insert("mem://in/a", "first");
    p.exchange.insert("mem://in/b", "second");

    let put = |correlation_id: &str, address: &str| {
        message(
            "PutFileRequest",
            correlation_id,
            json!({"pillar_id": "pillar-1", "file_id": "file1", "file_address": address}),
        )
    };

    let first = tokio::spawn({
        let mediator = p.mediator.clone();
        let message = put("race-1", "mem://in/a");
        async move { mediator.dispatch(message).await }
    });
    let second = tokio::spawn({
        let mediator = p.mediator.clone();
        let message = put("race-2", "mem://in/b");
        async move { mediator.dispatch(message).await }
    });
    first.await.unwrap();
    second.await.unwrap();

    let mut codes: Vec<ResponseCode> = ["race-1", "race-2"]
        .iter()
        .map(|id| p.bus.final_response(id).unwrap().response_info.response_code)
        .collect();
    codes.sort_by_key(|code| code.as_str());
    assert_eq!(
        codes,
        vec![
            ResponseCode::DuplicateFileFailure,
            ResponseCode::OperationCompleted
        ]
    );
    let stored = archive.content("books", "file1").unwrap();
    assert!(stored == "first" || stored == "second");
}

#[tokio::test]
async fn test_conversations_show_up_in_audit_trail() {
    let (p, archive) = pillar(AlarmLevel::Error);
    archive.insert("books", "file1", "content");

    p.mediator
        .dispatch(message(
            "IdentifyPillarsForGetFileRequest",
            "aud-1",
            json!({"file_id": "file1"}),
        ))
        .await;
    p.mediator
        .dispatch(message(
            "GetFileRequest",
            "aud-2",
            json!({
                "pillar_id": "pillar-1",
                "file_id": "file1",
                "file_address": "mem://out/file1",
            }),
        ))
        .await;
    assert_eq!(p.exchange.get("mem://out/file1").unwrap(), "content");

    p.mediator
        .dispatch(message(
            "GetAuditTrailsRequest",
            "aud-3",
            json!({"contributor": "pillar-1", "file_id": "file1"}),
        ))
        .await;

    match p.bus.final_response("aud-3").unwrap().payload {
        ResponsePayload::AuditTrails {
            delivery: Delivery::Inline { entries },
        } => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[1].correlation_id.as_deref(), Some("aud-2"));
            assert_eq!(entries[1].actor_on_file, "client-1");
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_filesystem_pillar_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = config(AlarmLevel::Error);
    let archive = Arc::new(
        FileSystemArchive::new(dir.path(), &config.pillar.collection_ids).unwrap(),
    );
    let p = assemble(config, archive);

    p.exchange.insert("mem://in/doc", "archived bytes");
    p.mediator
        .dispatch(message(
            "PutFileRequest",
            "fs-1",
            json!({"pillar_id": "pillar-1", "file_id": "doc", "file_address": "mem://in/doc"}),
        ))
        .await;
    assert_eq!(
        p.bus.final_response("fs-1").unwrap().response_info.response_code,
        ResponseCode::OperationCompleted
    );
    assert!(dir.path().join("books").exists());

    p.mediator
        .dispatch(message(
            "GetFileRequest",
            "fs-2",
            json!({
                "pillar_id": "pillar-1",
                "file_id": "doc",
                "file_address": "mem://out/doc",
                "file_part": {"part_offset": 9, "part_length": 5},
            }),
        ))
        .await;

    assert_eq!(p.exchange.get("mem://out/doc").unwrap(), "bytes");
}

#[tokio::test]
async fn test_checksum_pillar_serves_checksums_only() {
    let mut config = config(AlarmLevel::Error);
    config.pillar.pillar_type = PillarType::Checksum;
    let p = assemble(config, Arc::new(MemoryArchive::new(0)));

    p.mediator
        .dispatch(message(
            "IdentifyPillarsForGetFileRequest",
            "cs-1",
            json!({"file_id": "file1"}),
        ))
        .await;
    p.mediator
        .dispatch(message(
            "GetChecksumsRequest",
            "cs-2",
            json!({"pillar_id": "pillar-1", "file_ids": "all_file_ids"}),
        ))
        .await;

    assert!(p.bus.responses_for("cs-1").is_empty());
    let responses = p.bus.responses_for("cs-2");
    assert_eq!(responses.len(), 2);
    assert_eq!(
        responses[1].response_info.response_code,
        ResponseCode::OperationCompleted
    );
}
