//! Key layout of instance records in the registry store.
//!
//! Every instance lives under `service:<name>:<id>`, so one service's
//! instances share the prefix `service:<name>:` and all instances share
//! `service:`.

use uuid::Uuid;

pub const KEY_PREFIX: &str = "service:";

pub fn instance_key(name: &str, id: &Uuid) -> String {
    format!("{KEY_PREFIX}{name}:{id}")
}

pub fn service_prefix(name: &str) -> String {
    format!("{KEY_PREFIX}{name}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_keys_are_scoped_by_name_and_id() {
        let id = Uuid::new_v4();
        let key = instance_key("auth", &id);
        assert_eq!(key, format!("service:auth:{id}"));
        assert!(key.starts_with(&service_prefix("auth")));
        assert!(key.starts_with(KEY_PREFIX));
    }

    #[test]
    fn service_prefix_does_not_cover_longer_names() {
        let id = Uuid::new_v4();
        assert!(!instance_key("authz", &id).starts_with(&service_prefix("auth")));
    }
}
