//! End-to-end bus tests against a scripted fake controller on an in-memory pipe

use pretty_assertions::assert_eq;
use scalelink_core::bus::{ScaleBus, STATUS_SUCCESS};
use scalelink_core::config::BusConfig;
use scalelink_core::store::{EventStore, MemoryEventStore, SqliteEventStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

fn test_config() -> BusConfig {
    BusConfig {
        port_name: "pipe".into(),
        ..BusConfig::default()
    }
}

/// Device end of the pipe
struct FakeController {
    lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeController {
    fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    /// Next command the host wrote, as parsed JSON
    async fn next_command(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("host never wrote a command")
            .unwrap()
            .expect("host closed the pipe");
        serde_json::from_str(&line).unwrap()
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn reply(&mut self, command: &Value, mut body: Value) {
        body["message_uuid"] = command["message_uuid"].clone();
        self.send(&body.to_string()).await;
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("scalelink_core=debug")
        .try_init();
}

fn start(store: Arc<dyn EventStore>) -> (ScaleBus, FakeController) {
    init_tracing();
    let (host, device) = tokio::io::duplex(8192);
    let bus = ScaleBus::start(host, &test_config(), store);
    (bus, FakeController::new(device))
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_tare_round_trip() {
    let (bus, mut device) = start(Arc::new(MemoryEventStore::new()));

    let (reply, _) = tokio::join!(bus.tare(), async {
        let command = device.next_command().await;
        assert_eq!(command["message"], json!("TARE"));
        device
            .reply(&command, json!({"status": STATUS_SUCCESS, "offset": 8123}))
            .await;
    });

    let reply = reply.unwrap();
    assert!(reply.is_success());
    assert_eq!(reply.get("offset"), Some(&json!(8123)));
    assert!(reply.get("message_uuid").is_none());
}

#[tokio::test]
async fn test_calibrate_failure_is_a_reply_not_an_error() {
    let (bus, mut device) = start(Arc::new(MemoryEventStore::new()));

    let (reply, _) = tokio::join!(bus.calibrate(500.0), async {
        let command = device.next_command().await;
        assert_eq!(command["message"], json!("CALIBRATE:500"));
        device
            .reply(&command, json!({"status": "failed", "reason": "no weight placed"}))
            .await;
    });

    let reply = reply.unwrap();
    assert!(!reply.is_success());
    assert_eq!(reply.status(), Some("failed"));
}

#[tokio::test]
async fn test_responses_matched_by_id_not_order() {
    let (bus, mut device) = start(Arc::new(MemoryEventStore::new()));
    let timeout = Duration::from_secs(5);

    let device_side = async {
        let mut commands = Vec::new();
        for _ in 0..3 {
            commands.push(device.next_command().await);
        }
        let order: Vec<Value> = commands.iter().map(|c| c["message"].clone()).collect();
        assert_eq!(order, vec![json!("A"), json!("B"), json!("C")]);

        for command in commands.iter().rev() {
            let body = json!({"status": "success", "echo": command["message"]});
            device.reply(command, body).await;
        }
    };

    let (a, b, c, _) = tokio::join!(
        bus.send_and_wait("A", timeout),
        bus.send_and_wait("B", timeout),
        bus.send_and_wait("C", timeout),
        device_side
    );

    assert_eq!(a.unwrap().get("echo"), Some(&json!("A")));
    assert_eq!(b.unwrap().get("echo"), Some(&json!("B")));
    assert_eq!(c.unwrap().get("echo"), Some(&json!("C")));
    assert!(bus.all_messages().is_empty());
}

#[tokio::test]
async fn test_duplicate_response_is_buffered_not_redelivered() {
    let (bus, mut device) = start(Arc::new(MemoryEventStore::new()));

    let (reply, command) = tokio::join!(bus.tare(), async {
        let command = device.next_command().await;
        device.reply(&command, json!({"status": "success"})).await;
        command
    });
    assert!(reply.unwrap().is_success());

    device.reply(&command, json!({"status": "success"})).await;
    eventually(|| bus.latest_message().is_some()).await;

    let latest = bus.latest_message().unwrap();
    assert_eq!(
        latest.value.get("message_uuid"),
        Some(&command["message_uuid"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_late_reply_does_not_leak_into_next_request() {
    let (bus, mut device) = start(Arc::new(MemoryEventStore::new()));

    let (first, stale) = tokio::join!(bus.tare(), device.next_command());
    let err = first.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(bus.router().pending_requests(), 0);

    let (second, _) = tokio::join!(bus.tare(), async {
        let fresh = device.next_command().await;
        assert_ne!(fresh["message_uuid"], stale["message_uuid"]);
        device.reply(&stale, json!({"status": "stale"})).await;
        device.reply(&fresh, json!({"status": "success"})).await;
    });

    assert!(second.unwrap().is_success());
    let latest = bus.latest_message().unwrap();
    assert_eq!(latest.value.get("status"), Some(&json!("stale")));
}

#[tokio::test]
async fn test_reading_sequence_records_events() {
    let store = Arc::new(MemoryEventStore::new());
    let (bus, mut device) = start(store.clone());

    for weight in [10, 10, 16, 16, 9] {
        device.send(&json!({ "average": weight }).to_string()).await;
    }
    eventually(|| bus.current_weight() == 9.0 && store.len() == 2).await;

    let pairs: Vec<(f64, f64)> = store
        .in_order()
        .iter()
        .map(|e| (e.starting_weight, e.final_weight))
        .collect();
    assert_eq!(pairs, vec![(10.0, 16.0), (16.0, 9.0)]);
    assert_eq!(bus.scale_snapshot().baseline, Some(9.0));

    let newest_first = bus.events(&Default::default()).unwrap();
    assert_eq!(newest_first[0].final_weight, 9.0);
}

#[tokio::test]
async fn test_alternate_reading_field() {
    let store = Arc::new(MemoryEventStore::new());
    let (host, device) = tokio::io::duplex(8192);
    let config = BusConfig {
        reading_field: "weight".into(),
        ..test_config()
    };
    let bus = ScaleBus::start(host, &config, store.clone());
    let mut device = FakeController::new(device);

    device.send(r#"{"average": 99}"#).await;
    device
        .send(r#"{"sensor_0":"6.10","sensor_1":"6.15","weight":"12.25"}"#)
        .await;
    eventually(|| bus.current_weight() == 12.25).await;

    // The non-canonical key went to the status buffer instead
    let all = bus.all_messages();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].value.get("average"), Some(&json!(99)));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_lines_change_nothing() {
    let store = Arc::new(MemoryEventStore::new());
    let (bus, mut device) = start(store.clone());

    let (reply, _) = tokio::join!(bus.send_and_wait("TARE", Duration::from_secs(2)), async {
        let command = device.next_command().await;
        let id = command["message_uuid"].as_str().unwrap().to_string();
        device.send("Place weight...").await;
        device
            .send(&format!("message_uuid={} status=success average=50", id))
            .await;
        device.send(r#"{"average": 50"#).await;
        device.send("[50]").await;
    });

    assert!(reply.unwrap_err().is_timeout());
    assert_eq!(bus.current_weight(), 0.0);
    assert_eq!(bus.scale_snapshot().baseline, None);
    assert!(store.is_empty());
    assert!(bus.all_messages().is_empty());
}

#[tokio::test]
async fn test_status_broadcasts_polled_incrementally() {
    let (bus, mut device) = start(Arc::new(MemoryEventStore::new()));

    device.send(r#"{"status":"Calibration is required for sensors!"}"#).await;
    device.send(r#"{"status":"ready"}"#).await;
    eventually(|| bus.all_messages().len() == 2).await;

    let first = bus.messages_since(0);
    let cursor = first.last().unwrap().id;

    device.send(r#"{"status":"tared"}"#).await;
    eventually(|| bus.latest_message().map(|m| m.id) == Some(cursor + 1)).await;

    let newer = bus.messages_since(cursor);
    assert_eq!(newer.len(), 1);
    assert_eq!(newer[0].value.get("status"), Some(&json!("tared")));
}

#[tokio::test]
async fn test_events_persist_to_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.db");
    let store = Arc::new(SqliteEventStore::open(&path).unwrap());
    let (bus, mut device) = start(store.clone());

    for weight in [0.0, 20.0] {
        device.send(&json!({ "average": weight }).to_string()).await;
    }
    eventually(|| store.all().map(|e| e.len()).unwrap_or(0) == 1).await;
    drop(bus);

    let reopened = SqliteEventStore::open(&path).unwrap();
    let events = reopened.all().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].starting_weight, 0.0);
    assert_eq!(events[0].final_weight, 20.0);
}
