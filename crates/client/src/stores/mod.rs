//! Normalized client state.
//!
//! [`Store`] is the single source of truth that both REST confirmations and
//! socket events write to. Every write is one [`Action`] applied
//! synchronously under the store lock, so no writer ever holds the store
//! across an `.await`.

pub mod groups;
pub mod permissions;
pub mod profile;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use onechat_shared::{Group, GroupPatch, MessagePayload, User};
use serde::Serialize;

pub use groups::GroupsState;
pub use permissions::{PermissionKey, PermissionsState};
pub use profile::ProfileState;

/// A single self-contained store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetUser(User),
    UpdateUsername(String),
    UpdateAvatar(String),
    AddGroups(Vec<Group>),
    RemoveGroup(String),
    UpdateGroup(GroupPatch),
    ChangeIcon { group_id: String, url: String },
    /// The current user left: drop the group and zero its permission.
    LeaveGroup(String),
    AddMessage(MessagePayload),
    RemoveMessage { id: String, group_id: String },
    UpdateMessage(MessagePayload),
    SetPermission { key: PermissionKey, bits: u32 },
    DeletePermission(PermissionKey),
    Reset,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::SetUser(_) => "setUser",
            Action::UpdateUsername(_) => "updateUsername",
            Action::UpdateAvatar(_) => "updateAvatar",
            Action::AddGroups(_) => "addGroup",
            Action::RemoveGroup(_) => "removeGroup",
            Action::UpdateGroup(_) => "updateGroup",
            Action::ChangeIcon { .. } => "changeIcon",
            Action::LeaveGroup(_) => "leaveGroup",
            Action::AddMessage(_) => "addMessage",
            Action::RemoveMessage { .. } => "removeMessage",
            Action::UpdateMessage(_) => "updateMessage",
            Action::SetPermission { .. } => "setPermission",
            Action::DeletePermission(_) => "deletePermission",
            Action::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Store {
    pub profile: ProfileState,
    pub groups: GroupsState,
    pub permissions: PermissionsState,
}

impl Store {
    pub fn new(message_capacity: usize) -> Self {
        Self {
            profile: ProfileState::default(),
            groups: GroupsState::new(message_capacity),
            permissions: PermissionsState::default(),
        }
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::SetUser(user) => self.profile.set_user(user),
            Action::UpdateUsername(username) => {
                self.profile.update_username(&username);
            }
            Action::UpdateAvatar(url) => {
                self.profile.update_avatar(&url);
            }
            Action::AddGroups(groups) => self.groups.add_groups(groups),
            Action::RemoveGroup(id) => {
                self.groups.remove_group(&id);
                self.permissions.forget_group(&id);
            }
            Action::UpdateGroup(patch) => {
                self.groups.update_group(&patch);
            }
            Action::ChangeIcon { group_id, url } => {
                self.groups.change_icon(&group_id, &url);
            }
            Action::LeaveGroup(id) => {
                self.groups.remove_group(&id);
                self.permissions.invalidate_group(&id);
            }
            Action::AddMessage(payload) => {
                self.groups.add_message(payload);
            }
            Action::RemoveMessage { id, group_id } => {
                self.groups.remove_message(&id, &group_id);
            }
            Action::UpdateMessage(payload) => {
                self.groups.update_message(payload);
            }
            Action::SetPermission { key, bits } => self.permissions.set(key, bits),
            Action::DeletePermission(key) => {
                self.permissions.delete(&key);
            }
            Action::Reset => *self = Store::new(self.groups.capacity()),
        }
    }
}

/// Shared, cloneable handle to the [`Store`].
#[derive(Debug, Clone)]
pub struct StoreHandle {
    inner: Arc<RwLock<Store>>,
    revision: Arc<AtomicU64>,
}

impl StoreHandle {
    pub fn new(message_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Store::new(message_capacity))),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn dispatch(&self, action: Action) {
        crate::log_debug!("store: {}", action.name());
        let mut store = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        store.apply(action);
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of actions dispatched so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Run `f` against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        let store = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }

    pub fn snapshot(&self) -> Store {
        self.read(Store::clone)
    }

    pub fn group(&self, id: &str) -> Option<Group> {
        self.read(|s| s.groups.get(id).cloned())
    }

    pub fn permission(&self, key: &PermissionKey) -> Option<u32> {
        self.read(|s| s.permissions.get(key))
    }

    pub fn current_user(&self) -> Option<User> {
        self.read(|s| s.profile.current().cloned())
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.read(|s| s.profile.current_user_id().map(str::to_string))
    }
}
