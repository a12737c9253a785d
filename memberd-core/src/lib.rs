//! Memberd core library — domain types, member store, configuration, errors.
//!
//! Public API surface:
//! - [`types`] — domain structs
//! - [`error`] — [`StoreError`]
//! - [`store`] — the authoritative member store (load / save / reload)
//! - [`config`] — daemon configuration with per-path defaults

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::StoreError;
pub use store::MemberStore;
pub use types::{Event, Member};
