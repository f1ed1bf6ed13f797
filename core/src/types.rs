//! Records returned by `CrowdClient` operations.
//!
//! # Design
//! The guaranteed user fields are named struct fields. Custom attributes, only
//! present when attribute expansion is requested, stay an open mapping. The
//! wire key names (`first-name`, `display-name`, ...) remain reachable through
//! `UserRecord::get` and `UserRecord::to_map`.

use std::collections::BTreeMap;

/// Names of the guaranteed user keys as they appear on the wire.
pub const USER_KEYS: [&str; 6] = [
    "username",
    "first-name",
    "last-name",
    "display-name",
    "email",
    "active",
];

/// A Crowd user. Missing fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    /// Crowd sends `true` or `false`; kept verbatim.
    pub active: String,
    /// Custom attributes, first value only. Empty unless expansion was asked for.
    pub attributes: BTreeMap<String, String>,
}

impl UserRecord {
    /// Look up a field by its wire key. A custom attribute with the same name
    /// as a guaranteed key shadows it.
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.attributes.get(key) {
            return Some(value);
        }
        self.field(key)
    }

    pub fn is_active(&self) -> bool {
        self.active.trim().eq_ignore_ascii_case("true")
    }

    /// All fields keyed by wire name, attributes merged last.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = USER_KEYS
            .iter()
            .filter_map(|key| self.field(key).map(|v| (key.to_string(), v.to_string())))
            .collect();
        map.extend(self.attributes.clone());
        map
    }

    fn field(&self, key: &str) -> Option<&str> {
        let value = match key {
            "username" => &self.username,
            "first-name" => &self.first_name,
            "last-name" => &self.last_name,
            "display-name" => &self.display_name,
            "email" => &self.email,
            "active" => &self.active,
            _ => return None,
        };
        Some(value)
    }
}

/// An SSO session and the user it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub user: UserRecord,
}

/// Direct group memberships in server order.
pub type GroupList = Vec<String>;

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRecord {
        UserRecord {
            username: "jdoe".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            display_name: "Jane Doe".to_string(),
            email: "jdoe@example.com".to_string(),
            active: "true".to_string(),
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn get_resolves_wire_keys() {
        let user = user();
        assert_eq!(user.get("display-name"), Some("Jane Doe"));
        assert_eq!(user.get("username"), Some("jdoe"));
        assert_eq!(user.get("passwordLastChanged"), None);
    }

    #[test]
    fn attribute_shadows_guaranteed_key() {
        let mut user = user();
        user.attributes
            .insert("email".to_string(), "alias@example.com".to_string());
        assert_eq!(user.get("email"), Some("alias@example.com"));
        assert_eq!(user.email, "jdoe@example.com");

        let map = user.to_map();
        assert_eq!(map["email"], "alias@example.com");
        assert_eq!(map.len(), USER_KEYS.len());
    }

    #[test]
    fn to_map_includes_custom_attributes() {
        let mut user = user();
        user.attributes
            .insert("passwordLastChanged".to_string(), "1316486633000".to_string());
        let map = user.to_map();
        assert_eq!(map.len(), USER_KEYS.len() + 1);
        assert_eq!(map["passwordLastChanged"], "1316486633000");
    }

    #[test]
    fn active_flag() {
        let mut user = user();
        assert!(user.is_active());
        user.active = "false".to_string();
        assert!(!user.is_active());
        user.active = String::new();
        assert!(!user.is_active());
    }
}
