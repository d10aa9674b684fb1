use capscope::capture::{ByteOrder, CaptureWriter, CounterSpec, CounterValue};
use capscope::domain::ExportError;
use capscope::export::DocumentSummary;
use capscope::symbolization::{JitmapSymbolizer, MultiSymbolizer};
use capscope::Document;
use capscope_common::JITMAP_MARK;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const MAIN: u64 = JITMAP_MARK | 1;
const TICK: u64 = JITMAP_MARK | 2;

async fn symbolized_document() -> Arc<Document> {
    let mut w = CaptureWriter::new(ByteOrder::native(), 0);
    w.set_capture_time("2026-10-15T12:00:00Z");
    w.add_process(1, 0, 30, "/usr/bin/node server.js");
    w.add_jitmap(2, 0, 30, &[(MAIN, "js::main"), (TICK, "js::tick")]);
    w.add_sample(10, 0, 30, 30, &[TICK, MAIN]);
    w.add_sample(20, 0, 30, 31, &[TICK, MAIN]);
    w.add_sample(30, 0, 30, 30, &[MAIN]);
    w.define_counters(
        3,
        0,
        -1,
        &[CounterSpec {
            id: 1,
            category: "CPU",
            name: "Total",
            description: "Busy percentage",
            value: CounterValue::Double(0.0),
        }],
    );
    w.set_counters(15, 0, -1, &[(1, CounterValue::Double(12.5))]);
    w.set_counters(25, 0, -1, &[(1, CounterValue::Double(80.0))]);
    w.add_mark(40, 0, 30, 5, "node", "gc", "");

    let doc = Arc::new(Document::from_bytes(w.finish()).unwrap());
    let symbolizer = MultiSymbolizer::new().with(JitmapSymbolizer::new());
    doc.symbolize(symbolizer, CancellationToken::new()).await.unwrap();
    doc
}

#[tokio::test]
async fn test_summary_ranks_hotspots() {
    let doc = symbolized_document().await;
    let summary = DocumentSummary::new(&doc, 128, 10);

    assert!(summary.capture.symbolized);
    assert_eq!(summary.capture.capture_time, "2026-10-15T12:00:00Z");
    assert_eq!(summary.categories["samples"], 3);

    let names: Vec<&str> = summary.hotspots.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["js::tick", "js::main"]);
    let tick = &summary.hotspots[0];
    assert_eq!(tick.count, 2);
    assert_eq!(tick.nick.as_deref(), Some("JIT"));
    assert_eq!(tick.call_stacks, vec![vec!["js::main".to_string()]]);
    assert!((tick.percentage - 200.0 / 3.0).abs() < 1e-9);

    let top = DocumentSummary::new(&doc, 128, 1);
    assert_eq!(top.hotspots.len(), 1);
}

#[tokio::test]
async fn test_saved_summary_is_valid_json() {
    let doc = symbolized_document().await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("summary.json");
    DocumentSummary::new(&doc, 128, 5).save(&path).unwrap();

    let json: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["capture"]["frames"], 9);
    // the last mark ends the recording
    assert_eq!(json["capture"]["end"], 45);

    let node = json["processes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["pid"] == 30)
        .unwrap();
    assert_eq!(node["name"], "/usr/bin/node");
    assert_eq!(node["command_line"], "/usr/bin/node server.js");
    assert_eq!(node["threads"], serde_json::json!([31]));

    let counter = &json["counters"][0];
    assert_eq!(counter["name"], "Total");
    assert_eq!(counter["min"], 12.5);
    assert_eq!(counter["max"], 80.0);
    assert_eq!(counter["points"], 2);

    assert_eq!(json["marks"][0]["group"], "node");
    assert_eq!(json["marks"][0]["entries"][0]["count"], 1);
    assert_eq!(json["hotspots"][0]["name"], "js::tick");
}

#[tokio::test]
async fn test_save_into_missing_directory_fails() {
    let doc = symbolized_document().await;
    let dir = TempDir::new().unwrap();
    let err = DocumentSummary::new(&doc, 128, 5)
        .save(&dir.path().join("missing").join("summary.json"))
        .unwrap_err();
    assert!(matches!(err, ExportError::WriteFailed(_)));
}
