use crate::types::{GroupId, ItemKey, MessageId, TrackedItem, TrackedMessage};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::debug;

/// Result of offering a message to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// New single item, or first member of a new group.
    Created,
    /// Added to an existing group.
    Appended,
    /// Same id already tracked; the newer copy replaced it.
    Replaced,
    /// The group id is on the ignored list.
    Ignored,
    /// A newer copy of the same id is already tracked.
    Stale,
    /// Refused by [`AggregationStore::admit_absent`]: some copy of the id is already tracked.
    AlreadyTracked,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Created | Admission::Appended | Admission::Replaced)
    }
}

/// Pending items waiting to be flushed, plus the ignored group ids.
///
/// Every method is a short critical section; none of them await.
pub trait AggregationStore: Send + Sync {
    /// Inserts a message, keyed by its id or group id. Refuses members of ignored groups.
    fn admit(&self, message: TrackedMessage) -> Admission;

    /// Like [`AggregationStore::admit`], but leaves any tracked copy of the id alone.
    fn admit_absent(&self, message: TrackedMessage) -> Admission;

    /// Applies `update` to the copy of `id` created at `created_at`. Returns false when that copy is gone.
    fn modify(
        &self,
        key: ItemKey,
        id: MessageId,
        created_at: Instant,
        update: &mut dyn FnMut(&mut TrackedMessage),
    ) -> bool;

    fn get(&self, key: ItemKey) -> Option<TrackedItem>;

    /// Removes and returns the item only if `predicate` holds, checked under the same lock.
    fn take_if(&self, key: ItemKey, predicate: &dyn Fn(&TrackedItem) -> bool) -> Option<TrackedItem>;

    fn remove(&self, key: ItemKey) -> Option<TrackedItem>;

    /// Drops a single item or a group member by message id. Empty groups are dropped with it.
    fn remove_message(&self, id: MessageId) -> bool;

    fn contains_message(&self, id: MessageId) -> bool;

    /// Keys of all pending items: singles first, then groups.
    fn scan(&self) -> Vec<ItemKey>;

    /// Marks the group as ignored for the rest of the run and evicts anything buffered under it.
    fn ignore_group(&self, group_id: GroupId) -> Option<TrackedItem>;

    fn is_ignored(&self, group_id: GroupId) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct StoreState {
    singles: BTreeMap<MessageId, TrackedMessage>,
    groups: BTreeMap<GroupId, Vec<TrackedMessage>>,
    ignored: HashSet<GroupId>,
}

impl StoreState {
    fn contains(&self, id: MessageId) -> bool {
        self.singles.contains_key(&id) || self.groups.values().any(|members| members.iter().any(|m| m.id == id))
    }

    fn admit(&mut self, message: TrackedMessage) -> Admission {
        match message.group_id {
            None => {
                let existing = self.singles.get(&message.id).map(|m| m.created_at);
                match existing {
                    Some(created_at) if created_at > message.created_at => Admission::Stale,
                    Some(_) => {
                        self.singles.insert(message.id, message);
                        Admission::Replaced
                    }
                    None => {
                        self.singles.insert(message.id, message);
                        Admission::Created
                    }
                }
            }
            Some(group_id) => {
                if self.ignored.contains(&group_id) {
                    return Admission::Ignored;
                }
                let is_new = !self.groups.contains_key(&group_id);
                let members = self.groups.entry(group_id).or_default();
                let existing = members.iter().position(|m| m.id == message.id);
                match existing {
                    Some(index) if members[index].created_at > message.created_at => Admission::Stale,
                    Some(index) => {
                        members[index] = message;
                        Admission::Replaced
                    }
                    None => {
                        members.push(message);
                        if is_new {
                            Admission::Created
                        } else {
                            Admission::Appended
                        }
                    }
                }
            }
        }
    }

    fn find_mut(&mut self, key: ItemKey, id: MessageId) -> Option<&mut TrackedMessage> {
        match key {
            ItemKey::Single(single_id) if single_id == id => self.singles.get_mut(&id),
            ItemKey::Single(_) => None,
            ItemKey::Group(group_id) => self
                .groups
                .get_mut(&group_id)
                .and_then(|members| members.iter_mut().find(|m| m.id == id)),
        }
    }

    fn get(&self, key: ItemKey) -> Option<TrackedItem> {
        match key {
            ItemKey::Single(id) => self.singles.get(&id).cloned().map(TrackedItem::Single),
            ItemKey::Group(group_id) => self.groups.get(&group_id).map(|members| TrackedItem::Group {
                group_id,
                members: members.clone(),
            }),
        }
    }

    fn remove(&mut self, key: ItemKey) -> Option<TrackedItem> {
        match key {
            ItemKey::Single(id) => self.singles.remove(&id).map(TrackedItem::Single),
            ItemKey::Group(group_id) => self
                .groups
                .remove(&group_id)
                .map(|members| TrackedItem::Group { group_id, members }),
        }
    }
}

/// In-memory store. Nothing survives a restart and nothing bounds its size.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AggregationStore for MemoryStore {
    fn admit(&self, message: TrackedMessage) -> Admission {
        self.state().admit(message)
    }

    fn admit_absent(&self, message: TrackedMessage) -> Admission {
        let mut state = self.state();
        if state.contains(message.id) {
            return Admission::AlreadyTracked;
        }
        state.admit(message)
    }

    fn modify(
        &self,
        key: ItemKey,
        id: MessageId,
        created_at: Instant,
        update: &mut dyn FnMut(&mut TrackedMessage),
    ) -> bool {
        let mut state = self.state();
        match state.find_mut(key, id) {
            Some(message) if message.created_at == created_at => {
                update(message);
                true
            }
            _ => false,
        }
    }

    fn get(&self, key: ItemKey) -> Option<TrackedItem> {
        self.state().get(key)
    }

    fn take_if(&self, key: ItemKey, predicate: &dyn Fn(&TrackedItem) -> bool) -> Option<TrackedItem> {
        let mut state = self.state();
        let item = state.get(key)?;
        if !predicate(&item) {
            return None;
        }
        debug!("Removing {}", key);
        state.remove(key)
    }

    fn remove(&self, key: ItemKey) -> Option<TrackedItem> {
        self.state().remove(key)
    }

    fn remove_message(&self, id: MessageId) -> bool {
        let mut state = self.state();
        if state.singles.remove(&id).is_some() {
            return true;
        }
        let mut removed = false;
        state.groups.retain(|_, members| {
            let before = members.len();
            members.retain(|m| m.id != id);
            removed |= members.len() != before;
            !members.is_empty()
        });
        removed
    }

    fn contains_message(&self, id: MessageId) -> bool {
        self.state().contains(id)
    }

    fn scan(&self) -> Vec<ItemKey> {
        let state = self.state();
        state
            .singles
            .keys()
            .map(|id| ItemKey::Single(*id))
            .chain(state.groups.keys().map(|id| ItemKey::Group(*id)))
            .collect()
    }

    fn ignore_group(&self, group_id: GroupId) -> Option<TrackedItem> {
        let mut state = self.state();
        state.ignored.insert(group_id);
        state.remove(ItemKey::Group(group_id))
    }

    fn is_ignored(&self, group_id: GroupId) -> bool {
        self.state().ignored.contains(&group_id)
    }

    fn len(&self) -> usize {
        let state = self.state();
        state.singles.len() + state.groups.len()
    }
}
