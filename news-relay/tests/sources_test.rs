use chrono::{TimeZone, Utc};
use news_relay::traits::{EventStream, MessageLookup, MessageSource};
use news_relay::{JsonlEventStream, JsonlHistory, MediaKind, SourceEvent};
use std::path::PathBuf;

const EXPORT: &str = r##"
{"id": 3, "date": "2024-12-02T08:00:00Z", "text": "#news later"}
{"id": 1, "group_id": 9, "date": "2024-11-30T10:00:00Z", "text": "#news earlier", "media": {"kind": "image", "location": "https://cdn.example.com/1.jpg"}}
not json at all
{"id": 2, "group_id": 9, "date": "2024-11-30T10:00:00Z", "media": {"kind": "video", "location": "/tmp/2.mp4", "spoiler": true}}
"##;

fn export() -> JsonlHistory {
    JsonlHistory::from_lines(PathBuf::from("export.jsonl"), EXPORT)
}

#[tokio::test]
async fn history_is_sorted_and_skips_bad_lines() {
    let history = export();
    assert_eq!(history.len(), 3);

    let messages = history.history(None).await.unwrap();
    let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let video = messages[1].media.as_ref().unwrap();
    assert_eq!(video.kind, MediaKind::Video);
    assert!(video.spoiler);
    assert!(!messages[0].media.as_ref().unwrap().spoiler);
    assert_eq!(messages[1].text(), None);
}

#[tokio::test]
async fn history_starts_at_the_given_date() {
    let since = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
    let messages = export().history(Some(since)).await.unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, 3);
}

#[tokio::test]
async fn lookup_returns_only_known_ids() {
    let found = export().lookup(&[0, 2, 3, 77]).await.unwrap();
    let ids: Vec<i64> = found.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[tokio::test]
async fn open_reports_missing_exports() {
    assert!(JsonlHistory::open("/nonexistent/export.jsonl").await.is_err());
}

#[tokio::test]
async fn open_reads_the_export_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.jsonl");
    tokio::fs::write(&path, EXPORT).await.unwrap();

    let history = JsonlHistory::open(&path).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.source_name().contains("export.jsonl"));
}

#[tokio::test]
async fn event_stream_yields_events_in_order() {
    let raw: &[u8] = br##"{"event": "new", "message": {"id": 5, "date": "2024-12-01T09:00:00Z", "text": "#news hi"}}

{"event": "unknown"}
{"event": "edited", "message": {"id": 5, "date": "2024-12-01T09:00:00Z", "text": "#news hello"}}
{"event": "deleted", "ids": [5, 6]}
"##;
    let mut stream = JsonlEventStream::new(raw);

    match stream.next_event().await.unwrap() {
        Some(SourceEvent::New { message }) => assert_eq!(message.text(), Some("#news hi")),
        other => panic!("unexpected event {:?}", other),
    }
    match stream.next_event().await.unwrap() {
        Some(SourceEvent::Edited { message }) => assert_eq!(message.text(), Some("#news hello")),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(
        stream.next_event().await.unwrap(),
        Some(SourceEvent::Deleted { ids: vec![5, 6] })
    );
    assert_eq!(stream.next_event().await.unwrap(), None);
}
