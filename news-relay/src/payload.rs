use crate::text_filter::TextFilter;
use crate::types::{GroupId, PublishPayload, TrackedItem, TrackedMessage};

pub fn single_payload(message: &TrackedMessage, filter: &TextFilter) -> PublishPayload {
    PublishPayload {
        group_id: message.id,
        date: message.date.to_rfc3339(),
        text: filter.clean(message.text.as_deref().unwrap_or("")),
        media: vec![message.media.clone()],
    }
}

/// Date and caption come from any member; media only from members that reached READY.
pub fn group_payload(group_id: GroupId, members: &[TrackedMessage], filter: &TextFilter) -> PublishPayload {
    let date = members
        .first()
        .map(|m| m.date.to_rfc3339())
        .unwrap_or_default();
    let text = members
        .iter()
        .find_map(|m| m.text.as_deref().filter(|t| !t.is_empty()))
        .unwrap_or("");

    PublishPayload {
        group_id,
        date,
        text: filter.clean(text),
        media: members
            .iter()
            .filter(|m| m.is_ready())
            .map(|m| m.media.clone())
            .collect(),
    }
}

pub fn to_payload(item: &TrackedItem, filter: &TextFilter) -> PublishPayload {
    match item {
        TrackedItem::Single(message) => single_payload(message, filter),
        TrackedItem::Group { group_id, members } => group_payload(*group_id, members, filter),
    }
}
