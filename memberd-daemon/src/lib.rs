//! Memberd daemon: downstream clients, command dispatcher, socket runtime.

pub mod actions;
pub mod agenda;
pub mod client;
pub mod dispatcher;
mod error;
pub mod fotos;
pub mod protocol;
mod runtime;

pub use client::{ClientError, Downstream, ListTransport, ListsClient, UnixClient};
pub use dispatcher::{Clients, Dispatcher};
pub use error::DaemonError;
pub use protocol::{
    request_last_synced, request_ping, request_setpass, request_stop, request_sync, send_request,
    Command,
};
pub use runtime::{run, serve_connection, start_blocking};
