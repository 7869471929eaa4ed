//! Mutation gateway: one REST call per intent, then one store write on
//! success and none on failure.
//!
//! Writes here are confirmations. The same change usually arrives again over
//! the socket, which the store's upsert semantics absorb.

use onechat_shared::{
    ApiError, CreateGroupRequest, CreateInviteRequest, CreateMessageRequest, EditGroupRequest,
    EditMessageRequest, EntityRef, Group, GroupPatch, Invite, JoinResponse, LeaveResponse,
    Message, MessagePayload, PermissionGrant, PermissionQuery, SetPermissionRequest,
    UpdateUserRequest, UploadedFile, User,
};
use serde_json::Value;

use crate::api_client::{segment, ApiClient};
use crate::storage::{Storage, USER_KEY};
use crate::stores::{Action, PermissionKey, StoreHandle};

/// A file to upload as a single multipart field.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MutationGateway {
    api: ApiClient,
    store: StoreHandle,
    storage: Option<Storage>,
}

impl MutationGateway {
    pub fn new(api: ApiClient, store: StoreHandle) -> Self {
        Self {
            api,
            store,
            storage: None,
        }
    }

    /// Persist profile changes to `storage` as well.
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    fn commit(&self, action: Action) {
        self.store.dispatch(action);
    }

    fn persist_user(&self) {
        let (Some(storage), Some(user)) = (&self.storage, self.store.current_user()) else {
            return;
        };
        if let Err(e) = storage.save(USER_KEY, &user) {
            crate::log_warn!("Failed to persist user profile: {}", e);
        }
    }

    // --- Groups ---

    pub async fn create_group(&self, request: &CreateGroupRequest) -> Result<Group, ApiError> {
        let group: Group = self.api.post_json("/group/create", Some(request)).await?;
        self.commit(Action::AddGroups(vec![group.clone()]));
        Ok(group)
    }

    pub async fn join_group(&self, invite_code: &str) -> Result<Group, ApiError> {
        let path = format!("/invite/{}/join", segment(invite_code));
        let joined: JoinResponse = self.api.post_json::<Value, _>(&path, None).await?;
        self.commit(Action::AddGroups(vec![joined.group.clone()]));
        Ok(joined.group)
    }

    /// Blank fields are dropped; an edit with nothing left is not sent.
    pub async fn edit_group(
        &self,
        group_id: &str,
        request: &EditGroupRequest,
    ) -> Result<(), ApiError> {
        let request = request.normalized();
        if request.is_empty() {
            return Ok(());
        }
        let path = format!("/group/{}/edit", segment(group_id));
        let _: Value = self.api.patch_json(&path, &request).await?;
        self.commit(Action::UpdateGroup(GroupPatch {
            id: group_id.to_string(),
            name: request.name,
            description: request.description,
            icon_url: None,
        }));
        Ok(())
    }

    pub async fn delete_group(&self, group_id: &str) -> Result<(), ApiError> {
        let path = format!("/group/{}/delete", segment(group_id));
        self.api.delete_json(&path).await?;
        self.commit(Action::RemoveGroup(group_id.to_string()));
        Ok(())
    }

    pub async fn leave_group(&self, group_id: &str) -> Result<Option<LeaveResponse>, ApiError> {
        let path = format!("/group/{}/leave", segment(group_id));
        let left: Option<LeaveResponse> = self.api.post_json::<Value, _>(&path, None).await?;
        self.commit(Action::LeaveGroup(group_id.to_string()));
        Ok(left)
    }

    /// Returns the new icon URL when the server reports one.
    pub async fn upload_icon(
        &self,
        group_id: &str,
        upload: Upload,
    ) -> Result<Option<String>, ApiError> {
        let path = format!("/group/{}/icon", segment(group_id));
        let uploaded: Option<UploadedFile> = self
            .api
            .post_multipart(&path, "icon", &upload.file_name, upload.bytes, &upload.mime)
            .await?;
        let url = uploaded.map(|f| f.url);
        if let Some(url) = &url {
            self.commit(Action::ChangeIcon {
                group_id: group_id.to_string(),
                url: url.clone(),
            });
        }
        Ok(url)
    }

    // --- Messages ---

    pub async fn send_message(&self, group_id: &str, text: &str) -> Result<Message, ApiError> {
        let path = format!("/group/{}/message/create", segment(group_id));
        let body = CreateMessageRequest {
            text: text.to_string(),
        };
        let message: Message = self.api.post_json(&path, Some(&body)).await?;
        self.commit(Action::AddMessage(message_payload(group_id, message.clone())));
        Ok(message)
    }

    pub async fn edit_message(
        &self,
        group_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<Message, ApiError> {
        let path = format!("/group/{}/message/edit", segment(group_id));
        let body = EditMessageRequest {
            id: message_id.to_string(),
            text: text.to_string(),
        };
        match self.api.post_json::<_, Message>(&path, Some(&body)).await {
            Ok(message) => {
                self.commit(Action::UpdateMessage(message_payload(group_id, message.clone())));
                Ok(message)
            }
            Err(e) => Err(self.reconcile_stale(e, message_id, group_id)),
        }
    }

    pub async fn delete_message(&self, group_id: &str, message_id: &str) -> Result<(), ApiError> {
        let path = format!("/group/{}/message/{}", segment(group_id), segment(message_id));
        match self.api.delete_json(&path).await {
            Ok(_) => {
                self.commit(Action::RemoveMessage {
                    id: message_id.to_string(),
                    group_id: group_id.to_string(),
                });
                Ok(())
            }
            Err(e) => Err(self.reconcile_stale(e, message_id, group_id)),
        }
    }

    /// The server no longer knows the message: drop our copy too.
    fn reconcile_stale(&self, err: ApiError, message_id: &str, group_id: &str) -> ApiError {
        if let Some(action) = stale_message_action(&err, message_id, group_id) {
            crate::log_info!("Removing stale message {} from {}", message_id, group_id);
            self.commit(action);
        }
        err
    }

    // --- Permissions ---

    fn permission_key(&self, group_id: &str, user_id: Option<&str>) -> PermissionKey {
        match user_id {
            Some(user_id) if self.store.current_user_id().as_deref() != Some(user_id) => {
                PermissionKey::member(group_id, user_id)
            }
            _ => PermissionKey::own(group_id),
        }
    }

    /// Fetch and cache permission bits, for the current user when `user_id` is `None`.
    pub async fn fetch_permission(
        &self,
        group_id: &str,
        user_id: Option<&str>,
    ) -> Result<u32, ApiError> {
        let path = format!("/group/{}/member/permission", segment(group_id));
        let query = PermissionQuery {
            user_id: user_id.map(str::to_string),
        };
        let grant: PermissionGrant = self.api.post_json(&path, Some(&query)).await?;
        self.commit(Action::SetPermission {
            key: self.permission_key(group_id, user_id),
            bits: grant.permissions,
        });
        Ok(grant.permissions)
    }

    /// Cached bits, fetched on first need.
    pub async fn permission(&self, group_id: &str, user_id: Option<&str>) -> Result<u32, ApiError> {
        let key = self.permission_key(group_id, user_id);
        if let Some(bits) = self.store.permission(&key) {
            return Ok(bits);
        }
        self.fetch_permission(group_id, user_id).await
    }

    pub async fn set_permission(
        &self,
        group_id: &str,
        user_id: &str,
        bits: u32,
    ) -> Result<u32, ApiError> {
        let path = format!("/group/{}/member/permission", segment(group_id));
        let body = SetPermissionRequest {
            permissions: bits,
            user_id: user_id.to_string(),
        };
        let grant: Option<PermissionGrant> = self.api.patch_json(&path, &body).await?;
        let bits = grant.map_or(bits, |g| g.permissions);
        self.commit(Action::SetPermission {
            key: self.permission_key(group_id, Some(user_id)),
            bits,
        });
        Ok(bits)
    }

    // --- Invites ---

    pub async fn create_invite(&self, group_id: &str) -> Result<Invite, ApiError> {
        let body = CreateInviteRequest {
            group_id: group_id.to_string(),
        };
        self.api.post_json("/invite", Some(&body)).await
    }

    // --- Current user ---

    pub async fn update_user(
        &self,
        request: &UpdateUserRequest,
    ) -> Result<Option<String>, ApiError> {
        let data: Value = self.api.patch_json("/user/", request).await?;
        let username = data
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| request.username.clone());
        if let Some(username) = &username {
            self.commit(Action::UpdateUsername(username.clone()));
            self.persist_user();
        }
        Ok(username)
    }

    /// Purges the gateway's storage and store only. Use
    /// [`Session::delete_account`](crate::Session::delete_account) to also drop
    /// the session's token and socket.
    pub async fn delete_user(&self) -> Result<(), ApiError> {
        self.api.delete_json("/user/").await?;
        if let Some(storage) = &self.storage {
            storage.clear();
        }
        self.commit(Action::Reset);
        Ok(())
    }

    pub async fn upload_avatar(&self, upload: Upload) -> Result<String, ApiError> {
        let uploaded: UploadedFile = self
            .api
            .post_multipart("/user/avatar", "avatar", &upload.file_name, upload.bytes, &upload.mime)
            .await?;
        self.commit(Action::UpdateAvatar(uploaded.url.clone()));
        self.persist_user();
        Ok(uploaded.url)
    }

    pub fn current_user(&self) -> Option<User> {
        self.store.current_user()
    }
}

fn message_payload(group_id: &str, message: Message) -> MessagePayload {
    MessagePayload {
        message,
        group: EntityRef {
            id: group_id.to_string(),
        },
    }
}

/// Stale-entity failures remove the message locally; anything else writes nothing.
pub fn stale_message_action(err: &ApiError, message_id: &str, group_id: &str) -> Option<Action> {
    err.is_stale().then(|| Action::RemoveMessage {
        id: message_id.to_string(),
        group_id: group_id.to_string(),
    })
}
