//! Command protocol: the closed set of request kinds, plus the client-side
//! helpers used by the CLI to talk to a running daemon.
//!
//! Requests are kind-tagged JSON mappings, one per line. Responses are a
//! kind-specific mapping, `{"error": ...}`, `{"success": true, ...}`, or a
//! bare JSON `null` for kinds the daemon does not recognize.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{io_err, DaemonError};

/// Every command kind the dispatcher recognizes. Decoding an unknown tag
/// fails, which the dispatcher turns into the logged-and-dropped path.
///
/// Kinds that are forwarded verbatim to a downstream target carry their
/// extra fields in a flattened map so nothing is lost in transit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "sync")]
    Sync,

    #[serde(rename = "setpass")]
    SetPass {
        user: String,
        oldpass: String,
        newpass: String,
    },

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "fotoadmin-scan-userdirs")]
    FotoScanUserdirs {
        #[serde(flatten)]
        rest: Map<String, Value>,
    },

    #[serde(rename = "fotoadmin-move-fotos")]
    FotoMoveFotos {
        store: String,
        user: String,
        dir: String,
    },

    #[serde(rename = "fotoadmin-scan-fotos")]
    FotoScanFotos,

    #[serde(rename = "update-site-agenda")]
    UpdateSiteAgenda,

    #[serde(rename = "fotoadmin-create-event")]
    FotoCreateEvent {
        date: NaiveDate,
        name: String,
        #[serde(rename = "fullHumanName")]
        full_human_name: String,
    },

    #[serde(rename = "last-synced?")]
    LastSynced,

    #[serde(rename = "fin-get-account")]
    FinGetAccount {
        #[serde(flatten)]
        rest: Map<String, Value>,
    },

    #[serde(rename = "fin-get-debitors")]
    FinGetDebitors {
        #[serde(flatten)]
        rest: Map<String, Value>,
    },

    #[serde(rename = "fin-check-names")]
    FinCheckNames {
        #[serde(flatten)]
        rest: Map<String, Value>,
    },

    #[serde(rename = "fin-get-gnucash-object")]
    FinGetGnucashObject {
        #[serde(flatten)]
        rest: Map<String, Value>,
    },

    #[serde(rename = "fin-get-years")]
    FinGetYears {
        #[serde(flatten)]
        rest: Map<String, Value>,
    },

    #[serde(rename = "fin-get-errors")]
    FinGetErrors {
        #[serde(flatten)]
        rest: Map<String, Value>,
    },
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(socket: &Path, request: &Value) -> Result<Value, DaemonError> {
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }

    let mut stream = UnixStream::connect(socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        } else {
            io_err(socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(socket, e))?;
    stream.flush().map_err(|e| io_err(socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(|e| io_err(socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: Value = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

pub fn request_ping(socket: &Path) -> Result<Value, DaemonError> {
    send_request(socket, &json!({"type": "ping"}))
}

pub fn request_sync(socket: &Path) -> Result<Value, DaemonError> {
    send_request(socket, &json!({"type": "sync"}))
}

pub fn request_last_synced(socket: &Path) -> Result<Value, DaemonError> {
    send_request(socket, &json!({"type": "last-synced?"}))
}

pub fn request_setpass(
    socket: &Path,
    user: &str,
    oldpass: &str,
    newpass: &str,
) -> Result<Value, DaemonError> {
    send_request(
        socket,
        &json!({
            "type": "setpass",
            "user": user,
            "oldpass": oldpass,
            "newpass": newpass,
        }),
    )
}

pub fn request_stop(socket: &Path) -> Result<Value, DaemonError> {
    send_request(socket, &json!({"type": "stop"}))
}
