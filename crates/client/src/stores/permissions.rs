//! Permission store.
//!
//! An absent entry means "unknown" and must be fetched before it is trusted;
//! a stored `0` means the member holds no capabilities.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// `(group)` for the current user, `(group, user)` for another member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionKey {
    pub group_id: String,
    pub user_id: Option<String>,
}

impl PermissionKey {
    pub fn own(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            user_id: None,
        }
    }

    pub fn member(group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            user_id: Some(user_id.into()),
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user_id {
            Some(user_id) => write!(f, "{}/{}", self.group_id, user_id),
            None => f.write_str(&self.group_id),
        }
    }
}

impl FromStr for PermissionKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.split_once('/') {
            Some((group_id, user_id)) => PermissionKey::member(group_id, user_id),
            None => PermissionKey::own(s),
        })
    }
}

// String form so the key works as a JSON object key.
impl Serialize for PermissionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PermissionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PermissionsState {
    bits: BTreeMap<PermissionKey, u32>,
}

impl PermissionsState {
    pub fn get(&self, key: &PermissionKey) -> Option<u32> {
        self.bits.get(key).copied()
    }

    pub fn set(&mut self, key: PermissionKey, bits: u32) {
        self.bits.insert(key, bits);
    }

    pub fn delete(&mut self, key: &PermissionKey) -> bool {
        self.bits.remove(key).is_some()
    }

    /// After leaving: own bits drop to 0, member entries are forgotten.
    pub fn invalidate_group(&mut self, group_id: &str) {
        self.forget_group(group_id);
        self.bits.insert(PermissionKey::own(group_id), 0);
    }

    /// Forget every entry of a group, own and members.
    pub fn forget_group(&mut self, group_id: &str) {
        self.bits.retain(|key, _| key.group_id != group_id);
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_is_distinct_from_zero() {
        let mut perms = PermissionsState::default();
        let key = PermissionKey::own("g1");
        assert_eq!(perms.get(&key), None);
        perms.set(key.clone(), 0);
        assert_eq!(perms.get(&key), Some(0));
    }

    #[test]
    fn test_set_overwrites_and_delete_reports() {
        let mut perms = PermissionsState::default();
        let key = PermissionKey::member("g1", "u2");
        perms.set(key.clone(), 1);
        perms.set(key.clone(), 3);
        assert_eq!(perms.get(&key), Some(3));
        assert_eq!(perms.len(), 1);
        assert!(perms.delete(&key));
        assert!(!perms.delete(&key));
    }

    #[test]
    fn test_invalidate_group_zeroes_own_and_drops_members() {
        let mut perms = PermissionsState::default();
        perms.set(PermissionKey::own("g1"), 127);
        perms.set(PermissionKey::member("g1", "u2"), 3);
        perms.set(PermissionKey::own("g2"), 1);

        perms.invalidate_group("g1");
        assert_eq!(perms.get(&PermissionKey::own("g1")), Some(0));
        assert_eq!(perms.get(&PermissionKey::member("g1", "u2")), None);
        assert_eq!(perms.get(&PermissionKey::own("g2")), Some(1));
    }

    #[test]
    fn test_key_string_form() {
        let key = PermissionKey::member("g1", "u2");
        assert_eq!(key.to_string(), "g1/u2");
        assert_eq!("g1/u2".parse::<PermissionKey>().unwrap(), key);
        assert_eq!("g1".parse::<PermissionKey>().unwrap(), PermissionKey::own("g1"));

        let mut perms = PermissionsState::default();
        perms.set(key, 3);
        assert_eq!(serde_json::to_string(&perms).unwrap(), r#"{"bits":{"g1/u2":3}}"#);
    }
}
