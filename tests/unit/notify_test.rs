//! Tests for the notification sink

use prometheus_fleet::core::{build_notice, InMemoryNotifier, LogNotifier, Notifier};

#[test]
fn build_notice_stamps_time() {
    let notice = build_notice("run:ended", serde_json::json!({ "ok": true }));
    assert_eq!(notice.name, "run:ended");
    assert!(notice.created_at_ms > 0);
}

#[test]
fn in_memory_sink_is_bounded() {
    let mut sink = InMemoryNotifier::new(3);
    for i in 0..5 {
        sink.notify(build_notice(format!("n{i}"), serde_json::Value::Null));
    }
    let notices = sink.notices();
    assert_eq!(notices.len(), 3);
    assert_eq!(notices[0].name, "n2");
    assert_eq!(notices[2].name, "n4");
}

#[test]
fn log_sink_accepts_notices() {
    let mut sink = LogNotifier;
    sink.notify(build_notice("account:removed", serde_json::json!({})));
}
