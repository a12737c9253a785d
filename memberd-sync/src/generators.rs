//! Per-target change-set generators.
//!
//! Each generator is a pure function of the member-store snapshot: it reads
//! freely, writes nothing, and returns the full payload for one target. The
//! engine hands payloads to the matching sender without inspecting them.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use memberd_core::MemberStore;

use crate::lists::{ListChanges, ListDescriptor, Subscription};

/// Mail-routing map: login -> delivery address, plus one alias per group
/// expanding to its members' addresses.
pub fn postfix_payload(store: &MemberStore) -> Value {
    let mut map = Map::new();
    for member in store.members() {
        map.insert(member.name.clone(), Value::String(member.email.clone()));
    }
    for (group, emails) in group_emails(store) {
        map.insert(group, json!(emails));
    }
    json!({"type": "postfix", "map": map})
}

/// Transport map routing each group's list address into the list server.
pub fn postfix_lists_payload(store: &MemberStore) -> Value {
    let mut map = Map::new();
    for group in group_names(store) {
        map.insert(
            format!("{group}-post"),
            Value::String(format!("lists:{group}")),
        );
    }
    json!({"type": "postfix-lists", "map": map})
}

/// UNIX account map: login -> uid, gecos, and group memberships.
pub fn unix_payload(store: &MemberStore) -> Value {
    let mut map = Map::new();
    for member in store.members() {
        map.insert(
            member.name.clone(),
            json!({
                "uid": member.uid,
                "full_name": member.full_name,
                "groups": member.groups,
            }),
        );
    }
    json!({"type": "unix", "map": map})
}

/// Wiki account change records, keyed by login.
pub fn wiki_payload(store: &MemberStore) -> Value {
    let changes: Vec<Value> = store
        .members()
        .map(|member| {
            json!({
                "action": "upsert",
                "user": member.name,
                "full_name": member.full_name,
                "email": member.email,
            })
        })
        .collect();
    json!({"type": "wiki", "changes": changes})
}

/// Directory-service change records.
pub fn ldap_payload(store: &MemberStore) -> Value {
    let changes: Vec<Value> = store
        .members()
        .map(|member| {
            json!({
                "action": "upsert",
                "uid": member.name,
                "cn": member.full_name,
                "mail": member.email,
                "uid_number": member.uid,
            })
        })
        .collect();
    json!({"type": "ldap", "changes": changes})
}

/// Cloud-storage share mapping: group -> member logins.
pub fn storage_payload(store: &MemberStore) -> Value {
    let mut changes = Map::new();
    for (group, logins) in group_logins(store) {
        changes.insert(group, json!(logins));
    }
    json!({"type": "storage", "changes": changes})
}

/// Mailing-list changes: one list per group, every member subscribed to the
/// lists of their groups.
pub fn list_changes(store: &MemberStore) -> ListChanges {
    let mut changes = ListChanges::default();
    for group in group_names(store) {
        changes.create.push(ListDescriptor {
            description: format!("Members of {group}"),
            name: group,
        });
    }
    for member in store.members() {
        for group in &member.groups {
            changes.subscribe.push(Subscription {
                list: group.clone(),
                email: member.email.clone(),
            });
        }
    }
    changes
}

fn group_names(store: &MemberStore) -> Vec<String> {
    let mut names: Vec<String> = store
        .members()
        .flat_map(|m| m.groups.iter().cloned())
        .collect();
    names.sort();
    names.dedup();
    names
}

fn group_emails(store: &MemberStore) -> BTreeMap<String, Vec<String>> {
    let mut map = BTreeMap::<String, Vec<String>>::new();
    for member in store.members() {
        for group in &member.groups {
            map.entry(group.clone()).or_default().push(member.email.clone());
        }
    }
    map
}

fn group_logins(store: &MemberStore) -> BTreeMap<String, Vec<String>> {
    let mut map = BTreeMap::<String, Vec<String>>::new();
    for member in store.members() {
        for group in &member.groups {
            map.entry(group.clone()).or_default().push(member.name.clone());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use memberd_core::Member;
    use tempfile::TempDir;

    fn store_with(members: Vec<Member>) -> (TempDir, MemberStore) {
        let dir = TempDir::new().expect("tempdir");
        let mut store = MemberStore::load(dir.path().join("members.yaml")).expect("load");
        for member in members {
            store.insert(member);
        }
        (dir, store)
    }

    fn member(name: &str, uid: u32, groups: &[&str]) -> Member {
        Member {
            name: name.to_string(),
            full_name: format!("Member {name}"),
            email: format!("{name}@example.net"),
            uid,
            groups: groups.iter().map(|g| g.to_string()).collect(),
            password_hash: None,
        }
    }

    #[test]
    fn postfix_map_has_member_and_group_entries() {
        let (_dir, store) = store_with(vec![
            member("ann", 1001, &["leden", "webcie"]),
            member("bob", 1002, &["leden"]),
        ]);
        let payload = postfix_payload(&store);

        assert_eq!(payload["type"], "postfix");
        assert_eq!(payload["map"]["ann"], "ann@example.net");
        let leden = payload["map"]["leden"].as_array().expect("group alias");
        assert_eq!(leden.len(), 2);
        let webcie = payload["map"]["webcie"].as_array().expect("group alias");
        assert_eq!(webcie.len(), 1);
    }

    #[test]
    fn unix_map_carries_uid_and_groups() {
        let (_dir, store) = store_with(vec![member("ann", 1001, &["leden"])]);
        let payload = unix_payload(&store);

        assert_eq!(payload["map"]["ann"]["uid"], 1001);
        assert_eq!(payload["map"]["ann"]["groups"][0], "leden");
    }

    #[test]
    fn list_changes_subscribe_per_group_membership() {
        let (_dir, store) = store_with(vec![
            member("ann", 1001, &["leden", "webcie"]),
            member("bob", 1002, &["leden"]),
        ]);
        let changes = list_changes(&store);

        assert_eq!(changes.create.len(), 2, "one list per distinct group");
        assert_eq!(changes.subscribe.len(), 3, "one subscription per membership");
        assert!(changes.unsubscribe.is_empty());
    }

    #[test]
    fn empty_store_generates_empty_payloads() {
        let (_dir, store) = store_with(Vec::new());
        assert!(postfix_payload(&store)["map"]
            .as_object()
            .expect("map")
            .is_empty());
        assert!(list_changes(&store).is_empty());
    }
}
