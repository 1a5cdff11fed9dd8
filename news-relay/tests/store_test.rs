mod common;

use common::message;
use news_relay::{Admission, AggregationStore, ItemKey, ItemStatus, MemoryStore, TrackedItem, TrackedMessage};
use std::time::Duration;

fn tracked(id: i64, group_id: Option<i64>, text: Option<&str>) -> TrackedMessage {
    TrackedMessage::from_source(&message(id, group_id, text))
}

#[tokio::test(start_paused = true)]
async fn singles_are_keyed_by_message_id() {
    let store = MemoryStore::new();

    assert_eq!(store.admit(tracked(1, None, Some("a"))), Admission::Created);
    assert_eq!(store.admit(tracked(2, None, Some("b"))), Admission::Created);
    assert_eq!(store.len(), 2);
    assert!(matches!(store.get(ItemKey::Single(1)), Some(TrackedItem::Single(m)) if m.id == 1));
}

#[tokio::test(start_paused = true)]
async fn newer_copy_replaces_and_older_copy_is_stale() {
    let store = MemoryStore::new();

    let first = tracked(3, None, Some("first"));
    tokio::time::advance(Duration::from_millis(5)).await;
    let second = tracked(3, None, Some("second"));

    assert_eq!(store.admit(second), Admission::Created);
    assert_eq!(store.admit(first), Admission::Stale);

    let item = store.get(ItemKey::Single(3)).unwrap();
    assert_eq!(item.members()[0].text.as_deref(), Some("second"));
}

#[tokio::test(start_paused = true)]
async fn group_members_keep_arrival_order() {
    let store = MemoryStore::new();

    assert_eq!(store.admit(tracked(12, Some(5), None)), Admission::Created);
    assert_eq!(store.admit(tracked(10, Some(5), Some("caption"))), Admission::Appended);
    assert_eq!(store.admit(tracked(11, Some(5), None)), Admission::Appended);
    tokio::time::advance(Duration::from_millis(5)).await;
    assert_eq!(store.admit(tracked(10, Some(5), Some("edited"))), Admission::Replaced);

    let group = store.get(ItemKey::Group(5)).unwrap();
    let ids: Vec<i64> = group.members().iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![12, 10, 11]);
    assert_eq!(group.members()[1].text.as_deref(), Some("edited"));
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn single_and_group_ids_do_not_collide() {
    let store = MemoryStore::new();

    store.admit(tracked(7, None, Some("single")));
    store.admit(tracked(8, Some(7), None));

    assert_eq!(store.len(), 2);
    assert_eq!(store.scan(), vec![ItemKey::Single(7), ItemKey::Group(7)]);
}

#[tokio::test(start_paused = true)]
async fn modify_only_touches_the_matching_copy() {
    let store = MemoryStore::new();

    let old = tracked(20, None, Some("old"));
    let old_created = old.created_at;
    store.admit(old);
    tokio::time::advance(Duration::from_millis(5)).await;
    let new = tracked(20, None, Some("new"));
    let new_created = new.created_at;
    store.admit(new);

    let stale = store.modify(ItemKey::Single(20), 20, old_created, &mut |m: &mut TrackedMessage| {
        m.advance(ItemStatus::Ready);
    });
    assert!(!stale);
    assert!(!store.get(ItemKey::Single(20)).unwrap().all_ready());

    let fresh = store.modify(ItemKey::Single(20), 20, new_created, &mut |m: &mut TrackedMessage| {
        m.advance(ItemStatus::Ready);
    });
    assert!(fresh);
    assert!(store.get(ItemKey::Single(20)).unwrap().all_ready());
}

#[tokio::test(start_paused = true)]
async fn status_never_moves_backwards() {
    let mut message = tracked(21, None, Some("x"));
    assert!(message.advance(ItemStatus::Ready));
    let ready_at = message.last_update;

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(!message.advance(ItemStatus::DownloadingMedia));
    assert_eq!(message.status, ItemStatus::Ready);
    assert_eq!(message.last_update, ready_at);
}

#[tokio::test(start_paused = true)]
async fn take_if_checks_the_predicate_under_the_lock() {
    let store = MemoryStore::new();
    store.admit(tracked(30, Some(9), None));

    assert!(store.take_if(ItemKey::Group(9), &|item: &TrackedItem| item.all_ready()).is_none());
    assert_eq!(store.len(), 1);

    let taken = store.take_if(ItemKey::Group(9), &|_: &TrackedItem| true);
    assert!(matches!(taken, Some(TrackedItem::Group { group_id: 9, .. })));
    assert!(store.is_empty());
    assert!(store.take_if(ItemKey::Group(9), &|_: &TrackedItem| true).is_none());
}

#[tokio::test(start_paused = true)]
async fn removing_the_last_member_drops_the_group() {
    let store = MemoryStore::new();
    store.admit(tracked(40, Some(11), None));
    store.admit(tracked(41, Some(11), None));

    assert!(store.remove_message(40));
    assert!(store.contains_message(41));
    assert!(!store.contains_message(40));
    assert!(store.remove_message(41));
    assert!(store.get(ItemKey::Group(11)).is_none());
    assert!(!store.remove_message(41));
}

#[tokio::test(start_paused = true)]
async fn ignored_group_is_evicted_and_refused() {
    let store = MemoryStore::new();
    store.admit(tracked(50, Some(12), None));

    let evicted = store.ignore_group(12).expect("buffered member is evicted");
    assert_eq!(evicted.members().len(), 1);
    assert!(store.is_ignored(12));
    assert!(store.is_empty());

    assert_eq!(store.admit(tracked(51, Some(12), None)), Admission::Ignored);
    assert!(!Admission::Ignored.is_admitted());
    assert!(store.ignore_group(12).is_none());
}

#[tokio::test(start_paused = true)]
async fn idle_time_follows_the_latest_member_update() {
    let store = MemoryStore::new();
    store.admit(tracked(60, Some(13), None));
    tokio::time::advance(Duration::from_secs(2)).await;
    store.admit(tracked(61, Some(13), None));
    tokio::time::advance(Duration::from_secs(1)).await;

    let group = store.remove(ItemKey::Group(13)).unwrap();
    assert_eq!(group.idle_for(tokio::time::Instant::now()), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn admit_absent_leaves_tracked_copies_alone() {
    let store = MemoryStore::new();
    store.admit(tracked(60, Some(14), Some("original")));

    tokio::time::advance(Duration::from_millis(5)).await;
    assert_eq!(store.admit_absent(tracked(60, Some(14), Some("newer"))), Admission::AlreadyTracked);
    assert!(!Admission::AlreadyTracked.is_admitted());
    let group = store.get(ItemKey::Group(14)).unwrap();
    assert_eq!(group.members()[0].text.as_deref(), Some("original"));

    assert_eq!(store.admit_absent(tracked(61, Some(14), None)), Admission::Appended);
    assert_eq!(store.get(ItemKey::Group(14)).unwrap().members().len(), 2);

    store.ignore_group(15);
    assert_eq!(store.admit_absent(tracked(62, Some(15), None)), Admission::Ignored);
}
