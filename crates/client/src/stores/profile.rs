//! Current-user profile slot.

use onechat_shared::User;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileState {
    user: Option<User>,
}

impl ProfileState {
    pub fn current(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn current_user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    pub fn update_username(&mut self, username: &str) -> bool {
        let Some(user) = self.user.as_mut() else {
            return false;
        };
        user.username = username.to_string();
        true
    }

    pub fn update_avatar(&mut self, url: &str) -> bool {
        let Some(user) = self.user.as_mut() else {
            return false;
        };
        user.avatar_url = Some(url.to_string());
        true
    }

    pub fn clear(&mut self) {
        self.user = None;
    }
}
