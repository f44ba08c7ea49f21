//! Editor events read as JSON lines and folded into records.

use keystroke_agent::core::{Aggregator, BlockingSizeProbe, EventOutcome};
use keystroke_agent::feed::{EditorEvent, EventFeed, NO_PROJECT};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

/// Push `lines` through a feed and fold every event into an aggregator.
fn aggregate(lines: &[String], aggregator: &mut Aggregator) -> Vec<EventOutcome> {
    let input = lines.join("\n");
    let mut feed = EventFeed::new();
    feed.start_reader(Cursor::new(input.into_bytes())).unwrap();

    let mut outcomes = Vec::new();
    loop {
        match feed.receiver().recv_timeout(Duration::from_millis(200)) {
            Ok(event) => outcomes.push(aggregator.handle_event(&event)),
            Err(_) => break,
        }
    }
    outcomes
}

fn change(project: &str, file: &str, inserted: u64, deleted: u64) -> String {
    serde_json::json!({
        "kind": "change",
        "document": {"file_name": file},
        "project": {"directory": project},
        "changes": [{"inserted_len": inserted, "deleted_len": deleted}]
    })
    .to_string()
}

#[test]
fn test_typing_pasting_and_deleting() {
    let lines = vec![
        change("/work/app", "/work/app/a.rs", 1, 0),
        change("/work/app", "/work/app/a.rs", 1, 0),
        change("/work/app", "/work/app/a.rs", 1, 0),
        change("/work/app", "/work/app/b.rs", 5, 0),
        change("/work/app", "/work/app/b.rs", 0, 4),
    ];
    let mut aggregator = Aggregator::new(60);
    aggregate(&lines, &mut aggregator);

    let record = aggregator.record("/work/app").unwrap();
    let a = record.file("/work/app/a.rs").unwrap();
    assert_eq!((a.keystrokes, a.pastes, a.deletions), (3, 0, 0));
    let b = record.file("/work/app/b.rs").unwrap();
    assert_eq!((b.keystrokes, b.pastes, b.deletions), (0, 5, 4));
    assert_eq!(record.total_keystrokes, 3);
}

#[test]
fn test_noise_never_creates_records() {
    let lines = vec![
        change("/work/app", "/work/app/a.rs", 0, 0),
        serde_json::json!({
            "kind": "change",
            "document": {"file_name": "Untitled-1", "is_untitled": true},
            "project": {"directory": "/work/app"},
            "changes": [{"inserted_len": 3}]
        })
        .to_string(),
        serde_json::json!({
            "kind": "open",
            "document": {"is_untitled": true}
        })
        .to_string(),
    ];
    let mut aggregator = Aggregator::new(60);
    let outcomes = aggregate(&lines, &mut aggregator);

    assert_eq!(outcomes, vec![EventOutcome::Ignored; 3]);
    assert!(aggregator.is_empty());
}

#[test]
fn test_projects_flush_independently() {
    let lines = vec![
        change("/one", "/one/x.rs", 1, 0),
        change("/two", "/two/y.rs", 1, 0),
        serde_json::json!({"kind": "open", "document": {"file_name": "/etc/hosts"}}).to_string(),
    ];
    let mut aggregator = Aggregator::new(60);
    aggregate(&lines, &mut aggregator);
    assert_eq!(aggregator.len(), 3);

    let drained = aggregator.drain();
    assert_eq!(drained.ready.len(), 3);
    assert_eq!(drained.discarded, 0);

    let sentinel = drained
        .ready
        .iter()
        .find(|r| r.project_key == NO_PROJECT)
        .unwrap();
    assert!(sentinel.to_payload("0.1.4").project.is_none());
    assert!(aggregator.is_empty());
}

#[test]
fn test_file_length_is_snapshotted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.rs");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"fn main() {}\n").unwrap();
    let path = path.to_string_lossy().to_string();

    let mut aggregator = Aggregator::new(60).with_size_probe(Arc::new(BlockingSizeProbe));
    let event: EditorEvent = serde_json::from_value(serde_json::json!({
        "kind": "open",
        "document": {"file_name": path},
        "project": {"directory": dir.path().to_string_lossy()}
    }))
    .unwrap();
    aggregator.handle_event(&event);

    let key = dir.path().to_string_lossy().to_string();
    let payload = aggregator.record(&key).unwrap().to_payload("0.1.4");
    assert_eq!(payload.source[&path].length, 13);
    assert_eq!(payload.source[&path].open, 1);
}
