//! Wires change-set generators to downstream clients as sync actions.
//!
//! The resulting list is fixed at startup: which targets participate in a
//! cycle never changes during the process lifetime.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use memberd_core::MemberStore;
use memberd_sync::{generators, ListChanges, SyncAction, SyncError};

use crate::client::{Downstream, ListTransport};

/// Build the full action list: mail-routing maps, mailing lists, UNIX
/// accounts, wiki, directory service, cloud storage.
pub fn build_actions(
    store: Arc<RwLock<MemberStore>>,
    mail: Option<Arc<dyn Downstream>>,
    accounts: Option<Arc<dyn Downstream>>,
    lists: Option<Arc<dyn ListTransport>>,
) -> Vec<SyncAction> {
    vec![
        value_action("postfix", store.clone(), mail.clone(), generators::postfix_payload),
        value_action(
            "postfix-lists",
            store.clone(),
            mail.clone(),
            generators::postfix_lists_payload,
        ),
        lists_action(store.clone(), lists),
        value_action("unix", store.clone(), accounts.clone(), generators::unix_payload),
        value_action("wiki", store.clone(), mail.clone(), generators::wiki_payload),
        value_action("ldap", store.clone(), mail, generators::ldap_payload),
        value_action("storage", store, accounts, generators::storage_payload),
    ]
}

fn value_action(
    name: &'static str,
    store: Arc<RwLock<MemberStore>>,
    client: Option<Arc<dyn Downstream>>,
    generate: fn(&MemberStore) -> Value,
) -> SyncAction {
    SyncAction::new(
        name,
        move || Ok(generate(&read_store(&store))),
        move |payload| match &client {
            Some(client) => client
                .send(&payload)
                .map_err(|e| SyncError::transport(name, e)),
            None => Err(SyncError::transport(name, "target unavailable")),
        },
    )
}

fn lists_action(
    store: Arc<RwLock<MemberStore>>,
    client: Option<Arc<dyn ListTransport>>,
) -> SyncAction {
    SyncAction::new(
        "lists",
        move || Ok(serde_json::to_value(generators::list_changes(&read_store(&store)))?),
        move |payload| {
            let changes: ListChanges = serde_json::from_value(payload)?;
            let client = client
                .as_ref()
                .ok_or_else(|| SyncError::transport("lists", "target unavailable"))?;
            let result = client
                .apply_changes(&changes)
                .map_err(|e| SyncError::transport("lists", e))?;
            Ok(serde_json::to_value(result)?)
        },
    )
}

// Lock helpers shared with the dispatcher; a poisoned lock still guards the
// data, so recover the guard instead of propagating the panic.

pub(crate) fn read_store(store: &RwLock<MemberStore>) -> RwLockReadGuard<'_, MemberStore> {
    store.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_store(store: &RwLock<MemberStore>) -> RwLockWriteGuard<'_, MemberStore> {
    store.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;
    use tempfile::TempDir;

    use memberd_core::Member;
    use memberd_sync::{ApplyResult, Orchestrator, SyncState};

    use crate::client::ClientError;

    #[derive(Default)]
    struct RecordingClient {
        calls: Mutex<Vec<Value>>,
    }

    impl Downstream for RecordingClient {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn send(&self, request: &Value) -> Result<Value, ClientError> {
            self.calls.lock().expect("lock").push(request.clone());
            Ok(json!({"success": true}))
        }
    }

    #[derive(Default)]
    struct RecordingLists {
        calls: Mutex<Vec<ListChanges>>,
    }

    impl ListTransport for RecordingLists {
        fn apply_changes(&self, changes: &ListChanges) -> Result<ApplyResult, ClientError> {
            self.calls.lock().expect("lock").push(changes.clone());
            Ok(ApplyResult {
                success: true,
                messages: Vec::new(),
            })
        }
    }

    fn seeded_store(dir: &TempDir) -> Arc<RwLock<MemberStore>> {
        let mut store = MemberStore::load(dir.path().join("members.yaml")).expect("load");
        store.insert(Member {
            name: "ann".to_string(),
            full_name: "Ann Atoom".to_string(),
            email: "ann@example.net".to_string(),
            uid: 1001,
            groups: vec!["leden".to_string()],
            password_hash: None,
        });
        store.save().expect("save");
        Arc::new(RwLock::new(store))
    }

    #[test]
    fn full_cycle_routes_each_payload_to_its_target() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded_store(&dir);
        let mail = Arc::new(RecordingClient::default());
        let accounts = Arc::new(RecordingClient::default());
        let lists = Arc::new(RecordingLists::default());

        let actions = build_actions(
            store.clone(),
            Some(mail.clone()),
            Some(accounts.clone()),
            Some(lists.clone()),
        );
        assert_eq!(actions.len(), 7);

        let orchestrator = Orchestrator::new(
            actions,
            move || {
                write_store(&store).reload()?;
                Ok(())
            },
            Arc::new(SyncState::default()),
        );
        orchestrator.sync().expect("sync");

        let mail_calls = mail.calls.lock().expect("lock");
        let mail_kinds: Vec<&str> = mail_calls
            .iter()
            .map(|v| v["type"].as_str().expect("type"))
            .collect();
        assert_eq!(mail_calls.len(), 4, "postfix, postfix-lists, wiki, ldap");
        for kind in ["postfix", "postfix-lists", "wiki", "ldap"] {
            assert!(mail_kinds.contains(&kind), "mail target missing {kind}");
        }

        let accounts_calls = accounts.calls.lock().expect("lock");
        assert_eq!(accounts_calls.len(), 2, "unix and storage");

        let lists_calls = lists.calls.lock().expect("lock");
        assert_eq!(lists_calls.len(), 1);
        assert_eq!(lists_calls[0].subscribe.len(), 1);
    }

    #[test]
    fn unavailable_target_fails_only_its_own_action() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded_store(&dir);
        let accounts = Arc::new(RecordingClient::default());

        // Mail and lists never connected; unix and storage must still run.
        let actions = build_actions(store, None, Some(accounts.clone()), None);
        let orchestrator =
            Orchestrator::new(actions, || Ok(()), Arc::new(SyncState::default()));
        orchestrator.sync().expect("sync");

        assert_eq!(accounts.calls.lock().expect("lock").len(), 2);
    }
}
