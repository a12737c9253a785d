//! Command dispatcher: one entry point for every inbound request.
//!
//! All state-mutating command kinds are serialized behind a single operation
//! lock — a sync cycle reads the same authoritative store that `setpass` and
//! the photo-admin sagas mutate, so interleaving them could ship a stale or
//! half-written snapshot. Read-only kinds (`ping`, `last-synced?`, finance
//! queries) never take the lock, so status queries stay responsive while a
//! multi-second cycle runs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde_json::{json, Value};

use memberd_core::MemberStore;
use memberd_sync::{Orchestrator, SyncState};

use crate::actions::write_store;
use crate::agenda::AgendaRefresher;
use crate::client::{ClientError, Downstream};
use crate::fotos::PhotoScanner;
use crate::protocol::Command;

/// The untyped downstream handles, each `None` when its startup connection
/// failed.
pub struct Clients {
    pub mail: Option<Arc<dyn Downstream>>,
    pub accounts: Option<Arc<dyn Downstream>>,
    pub finance: Option<Arc<dyn Downstream>>,
}

pub struct Dispatcher {
    store: Arc<RwLock<MemberStore>>,
    orchestrator: Orchestrator,
    state: Arc<SyncState>,
    clients: Clients,
    fotos: Box<dyn PhotoScanner>,
    agenda: Box<dyn AgendaRefresher>,
    op_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<RwLock<MemberStore>>,
        orchestrator: Orchestrator,
        clients: Clients,
        fotos: Box<dyn PhotoScanner>,
        agenda: Box<dyn AgendaRefresher>,
    ) -> Self {
        let state = orchestrator.state();
        Dispatcher {
            store,
            orchestrator,
            state,
            clients,
            fotos,
            agenda,
            op_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> Arc<SyncState> {
        self.state.clone()
    }

    /// Handle one request to completion. `None` means the kind was not
    /// recognized: logged and dropped, no response.
    pub fn dispatch(&self, request: Value) -> Option<Value> {
        let command: Command = match serde_json::from_value(request.clone()) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(error = %err, %request, "unrecognized command");
                return None;
            }
        };

        match command {
            Command::Sync => {
                let _ops = self.lock_ops();
                Some(self.handle_sync())
            }
            Command::SetPass {
                user,
                oldpass,
                newpass,
            } => {
                let _ops = self.lock_ops();
                Some(self.handle_setpass(&user, &oldpass, &newpass))
            }
            Command::Ping => Some(json!({"pong": true})),
            Command::FotoScanUserdirs { .. } => {
                Some(forward(&self.clients.accounts, "accounts", &request))
            }
            Command::FotoMoveFotos {
                store: photo_store,
                user,
                dir,
            } => {
                let _ops = self.lock_ops();
                Some(self.handle_move_fotos(&request, &photo_store, &user, &dir))
            }
            Command::FotoScanFotos => {
                let _ops = self.lock_ops();
                Some(self.fotos.scan())
            }
            Command::UpdateSiteAgenda => {
                let _ops = self.lock_ops();
                Some(self.agenda.update())
            }
            Command::FotoCreateEvent { .. } => {
                let _ops = self.lock_ops();
                Some(forward(&self.clients.mail, "mail", &request))
            }
            Command::LastSynced => Some(json!(self.state.last_sync_unix())),
            Command::FinGetAccount { .. }
            | Command::FinGetDebitors { .. }
            | Command::FinCheckNames { .. }
            | Command::FinGetGnucashObject { .. }
            | Command::FinGetYears { .. }
            | Command::FinGetErrors { .. } => {
                // Transport failures become structured errors, never panics.
                Some(forward(&self.clients.finance, "finance", &request))
            }
        }
    }

    fn handle_sync(&self) -> Value {
        match self.orchestrator.sync() {
            Ok(()) => json!({"success": true}),
            Err(err) => {
                tracing::error!(error = %err, "sync cycle failed before fan-out");
                json!({"error": err.to_string()})
            }
        }
    }

    fn handle_setpass(&self, user: &str, oldpass: &str, newpass: &str) -> Value {
        {
            let mut store = write_store(&self.store);
            let Some(member) = store.by_name(user) else {
                return json!({"error": "no such user"});
            };
            if !member.check_password(oldpass) {
                return json!({"error": "wrong old password"});
            }
            if let Err(err) = store.set_password(user, newpass) {
                return json!({"error": err.to_string()});
            }
            if let Err(err) = store.save() {
                tracing::error!(error = %err, "could not persist password change");
                return json!({"error": err.to_string()});
            }
        }

        // Replicate to the two targets that hold their own password state.
        let replication = json!({"type": "setpass", "user": user, "pass": newpass});
        for (client, name) in [
            (&self.clients.mail, "mail"),
            (&self.clients.accounts, "accounts"),
        ] {
            if let Err(err) = send_to(client, name, &replication) {
                tracing::error!(target_name = name, error = %err, "setpass replication failed");
                return json!({"error": format!("replication to {name} failed: {err}")});
            }
        }
        json!({"success": true})
    }

    /// Three-step saga. Each step's failure is returned as-is and the later
    /// steps are skipped; a completed step 1 is not rolled back if step 2 or
    /// 3 fails (known limitation, observable through the returned error).
    fn handle_move_fotos(&self, request: &Value, photo_store: &str, user: &str, dir: &str) -> Value {
        let ret = match send_to(&self.clients.mail, "mail", request) {
            Ok(ret) => ret,
            Err(err) => return json!({"error": err.to_string()}),
        };
        if ret.get("success").is_none() {
            return ret;
        }

        let ret = self.fotos.scan();
        if ret.get("success").is_none() {
            return ret;
        }

        let remove = json!({
            "type": "fotoadmin-remove-moved-fotos",
            "store": photo_store,
            "user": user,
            "dir": dir,
        });
        forward(&self.clients.accounts, "accounts", &remove)
    }

    fn lock_ops(&self) -> MutexGuard<'_, ()> {
        // a poisoned lock still provides mutual exclusion
        self.op_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn send_to(
    client: &Option<Arc<dyn Downstream>>,
    name: &'static str,
    request: &Value,
) -> Result<Value, ClientError> {
    match client {
        Some(client) => client.send(request),
        None => Err(ClientError::Unavailable(name)),
    }
}

fn forward(client: &Option<Arc<dyn Downstream>>, name: &'static str, request: &Value) -> Value {
    match send_to(client, name, request) {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(target_name = name, error = %err, "forwarding failed");
            json!({"error": err.to_string()})
        }
    }
}
