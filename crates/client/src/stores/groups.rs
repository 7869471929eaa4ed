//! Group store: groups keyed by id, each with a bounded chronological
//! message list.
//!
//! Every operation is total. A missing group or message is the no-op path,
//! never an error.

use std::collections::{BTreeMap, VecDeque};

use onechat_shared::{Group, GroupPatch, Message, MessagePayload};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupsState {
    #[serde(skip)]
    capacity: usize,
    groups: BTreeMap<String, Group>,
}

impl GroupsState {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            groups: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.groups.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn messages(&self, group_id: &str) -> Option<&VecDeque<Message>> {
        self.groups.get(group_id).map(|g| &g.messages)
    }

    /// Upsert every group by id; later entries win over earlier ones.
    ///
    /// Metadata is replaced wholesale. An incoming group without messages
    /// keeps the messages already stored for that id.
    pub fn add_groups(&mut self, groups: impl IntoIterator<Item = Group>) {
        for group in groups {
            self.upsert(group);
        }
    }

    fn upsert(&mut self, mut group: Group) {
        trim_front(&mut group.messages, self.capacity);
        dedup_by_id(&mut group.messages);

        if group.messages.is_empty() {
            if let Some(existing) = self.groups.get_mut(&group.id) {
                group.messages = std::mem::take(&mut existing.messages);
            }
        }
        self.groups.insert(group.id.clone(), group);
    }

    pub fn remove_group(&mut self, id: &str) -> Option<Group> {
        self.groups.remove(id)
    }

    /// Merge the populated fields of `patch`. No-op if the group is absent.
    pub fn update_group(&mut self, patch: &GroupPatch) -> bool {
        let Some(group) = self.groups.get_mut(&patch.id) else {
            return false;
        };
        if let Some(name) = &patch.name {
            group.name = name.clone();
        }
        if let Some(icon_url) = &patch.icon_url {
            group.icon_url = Some(icon_url.clone());
        }
        if let Some(description) = &patch.description {
            group.description = Some(description.clone());
        }
        true
    }

    pub fn change_icon(&mut self, id: &str, url: &str) -> bool {
        let Some(group) = self.groups.get_mut(id) else {
            return false;
        };
        group.icon_url = Some(url.to_string());
        true
    }

    /// Append to the target group, evicting the oldest messages past capacity.
    ///
    /// A message whose id is already stored replaces the stored copy in place
    /// instead of being appended again. Messages for an unknown group are
    /// dropped.
    pub fn add_message(&mut self, payload: MessagePayload) -> bool {
        let Some(group) = self.groups.get_mut(&payload.group.id) else {
            crate::log_debug!(
                "Dropping message {} for unloaded group {}",
                payload.message.id,
                payload.group.id
            );
            return false;
        };

        let message = payload.message;
        if let Some(slot) = group.messages.iter_mut().find(|m| m.id == message.id) {
            *slot = message;
            return true;
        }

        group.messages.push_back(message);
        trim_front(&mut group.messages, self.capacity);
        true
    }

    pub fn remove_message(&mut self, id: &str, group_id: &str) -> bool {
        let Some(group) = self.groups.get_mut(group_id) else {
            return false;
        };
        let Some(index) = group.messages.iter().position(|m| m.id == id) else {
            return false;
        };
        group.messages.remove(index);
        true
    }

    /// Replace the stored message with the same id.
    ///
    /// Edits of messages this client doesn't hold are dropped, and so is an
    /// edit whose `updatedAt` predates the stored one.
    pub fn update_message(&mut self, payload: MessagePayload) -> bool {
        let Some(group) = self.groups.get_mut(&payload.group.id) else {
            return false;
        };
        let incoming = payload.message;
        let Some(slot) = group.messages.iter_mut().find(|m| m.id == incoming.id) else {
            return false;
        };

        if let (Some(stored), Some(new)) = (slot.updated_at, incoming.updated_at) {
            if new < stored {
                crate::log_debug!("Ignoring out-of-date edit for message {}", incoming.id);
                return false;
            }
        }

        *slot = incoming;
        true
    }
}

fn trim_front(messages: &mut VecDeque<Message>, capacity: usize) {
    while messages.len() > capacity {
        messages.pop_front();
    }
}

/// Keep the last copy of each id, preserving order of those survivors.
fn dedup_by_id(messages: &mut VecDeque<Message>) {
    let mut last_index = std::collections::HashMap::new();
    for (index, m) in messages.iter().enumerate() {
        last_index.insert(m.id.clone(), index);
    }
    if last_index.len() == messages.len() {
        return;
    }
    let mut index = 0;
    messages.retain(|m| {
        let keep = last_index.get(&m.id) == Some(&index);
        index += 1;
        keep
    });
}
