//! The fan-out engine: one sync cycle refreshes the snapshot, then runs
//! every configured generate-then-send pair concurrently.
//!
//! Each unit runs under [`run_isolated`]: an error in one target is logged
//! with the action's name and never reaches the other units or the caller.
//! The scoped-thread join is the cycle barrier — `sync` does not return
//! until every unit has finished, success or failure.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::error::SyncError;

pub type GenerateFn = Box<dyn Fn() -> Result<Value, SyncError> + Send + Sync>;
pub type SendFn = Box<dyn Fn(Value) -> Result<Value, SyncError> + Send + Sync>;
pub type RefreshFn = Box<dyn Fn() -> Result<(), SyncError> + Send + Sync>;

/// One target's unit of work within a cycle: build the payload, deliver it.
/// The engine treats the payload as an opaque value.
pub struct SyncAction {
    pub name: &'static str,
    pub generate: GenerateFn,
    pub send: SendFn,
}

impl SyncAction {
    pub fn new<G, S>(name: &'static str, generate: G, send: S) -> Self
    where
        G: Fn() -> Result<Value, SyncError> + Send + Sync + 'static,
        S: Fn(Value) -> Result<Value, SyncError> + Send + Sync + 'static,
    {
        SyncAction {
            name,
            generate: Box::new(generate),
            send: Box::new(send),
        }
    }
}

/// Process-wide sync bookkeeping. Written only by the orchestrator (under
/// the dispatcher's operation lock); readable lock-free at any time, so a
/// `last-synced?` query never blocks on a running cycle.
#[derive(Debug, Default)]
pub struct SyncState {
    last_sync_unix: AtomicU64,
    in_progress: AtomicBool,
}

impl SyncState {
    pub fn last_sync_unix(&self) -> u64 {
        self.last_sync_unix.load(Ordering::Relaxed)
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Relaxed)
    }

    fn begin(&self) {
        self.in_progress.store(true, Ordering::Relaxed);
    }

    fn finish(&self) {
        self.in_progress.store(false, Ordering::Relaxed);
    }

    /// Stamp completion of a cycle. Strictly increasing even if the clock
    /// did not advance between two cycles.
    fn stamp(&self) {
        let prev = self.last_sync_unix.load(Ordering::Relaxed);
        let now = unix_seconds_now();
        self.last_sync_unix
            .store(now.max(prev + 1), Ordering::Relaxed);
    }
}

/// Clears `in_progress` on every exit path out of `sync`, including errors.
struct InProgressGuard<'a>(&'a SyncState);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Owns the fixed list of sync actions and the snapshot refresher.
pub struct Orchestrator {
    actions: Vec<SyncAction>,
    refresh: RefreshFn,
    state: Arc<SyncState>,
}

impl Orchestrator {
    pub fn new<R>(actions: Vec<SyncAction>, refresh: R, state: Arc<SyncState>) -> Self
    where
        R: Fn() -> Result<(), SyncError> + Send + Sync + 'static,
    {
        Orchestrator {
            actions,
            refresh: Box::new(refresh),
            state,
        }
    }

    pub fn state(&self) -> Arc<SyncState> {
        self.state.clone()
    }

    /// Run one full sync cycle: refresh the snapshot, fan out to every
    /// configured target concurrently, wait for all units, stamp the
    /// completion time.
    ///
    /// Individual target failures are logged and swallowed; only a failed
    /// snapshot refresh makes this return an error.
    pub fn sync(&self) -> Result<(), SyncError> {
        self.state.begin();
        let _guard = InProgressGuard(&self.state);

        let started = Instant::now();
        (self.refresh)()?;
        tracing::info!(
            duration_ms = started.elapsed().as_millis() as u64,
            "snapshot refreshed"
        );

        let outstanding = AtomicUsize::new(self.actions.len());
        thread::scope(|scope| {
            for action in &self.actions {
                let outstanding = &outstanding;
                scope.spawn(move || {
                    run_isolated(action.name, || run_unit(action, outstanding));
                    outstanding.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        self.state.stamp();
        tracing::info!(
            targets = self.actions.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "sync cycle finished"
        );
        Ok(())
    }
}

fn run_unit(action: &SyncAction, outstanding: &AtomicUsize) -> Result<(), SyncError> {
    let started = Instant::now();
    let payload = (action.generate)()?;
    tracing::info!(
        action = action.name,
        duration_ms = started.elapsed().as_millis() as u64,
        "generate"
    );

    let started = Instant::now();
    (action.send)(payload)?;
    let to_go = outstanding.load(Ordering::SeqCst).saturating_sub(1);
    tracing::info!(
        action = action.name,
        duration_ms = started.elapsed().as_millis() as u64,
        to_go,
        "send"
    );
    Ok(())
}

/// Run one unit of fan-out work, logging any error with the unit's name
/// instead of propagating it. Shared by every fan-out unit.
pub fn run_isolated<F>(name: &str, f: F)
where
    F: FnOnce() -> Result<(), SyncError>,
{
    if let Err(err) = f() {
        tracing::error!(action = name, error = %err, "uncaught error in sync action");
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
