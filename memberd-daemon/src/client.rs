//! Downstream target clients.
//!
//! Each target is connected exactly once at startup. A failed connection is
//! logged and the handle degraded to `None` for the process lifetime — every
//! later send against it fails immediately with an attributable error, which
//! the fan-out engine isolates per target.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;

use memberd_sync::{ApplyResult, ListChanges};

#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection setup failed at startup. Non-fatal: the target is recorded
    /// as unavailable instead of aborting the daemon.
    #[error("could not connect to {target} at {socket}: {source}")]
    Connect {
        target: &'static str,
        socket: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A send against a target whose startup connection failed.
    #[error("target {0} is unavailable")]
    Unavailable(&'static str),

    #[error("I/O error talking to {target}: {source}")]
    Io {
        target: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} closed the connection before responding")]
    ClosedByPeer(&'static str),

    #[error("JSON error talking to {target}: {source}")]
    Json {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// One request/response exchange against a downstream target. The request
/// and response are untyped kind-tagged mappings.
pub trait Downstream: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, request: &Value) -> Result<Value, ClientError>;
}

/// The schema-typed interface of the mailing-list target.
pub trait ListTransport: Send + Sync {
    fn apply_changes(&self, changes: &ListChanges) -> Result<ApplyResult, ClientError>;
}

/// Newline-delimited JSON over a unix-domain socket, connected once at
/// startup. The stream mutex is the per-client serialization point: several
/// concurrent fan-out units may share one client.
pub struct UnixClient {
    name: &'static str,
    stream: Mutex<BufReader<UnixStream>>,
}

impl UnixClient {
    pub fn connect(name: &'static str, socket: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket).map_err(|source| ClientError::Connect {
            target: name,
            socket: socket.to_path_buf(),
            source,
        })?;
        Ok(UnixClient {
            name,
            stream: Mutex::new(BufReader::new(stream)),
        })
    }
}

impl Downstream for UnixClient {
    fn name(&self) -> &'static str {
        self.name
    }

    fn send(&self, request: &Value) -> Result<Value, ClientError> {
        let payload = serde_json::to_string(request).map_err(|source| ClientError::Json {
            target: self.name,
            source,
        })?;

        // a poisoned mutex still provides exclusion
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let io = |source| ClientError::Io {
            target: self.name,
            source,
        };
        stream.get_mut().write_all(payload.as_bytes()).map_err(io)?;
        stream.get_mut().write_all(b"\n").map_err(io)?;
        stream.get_mut().flush().map_err(io)?;

        let mut line = String::new();
        let read = stream.read_line(&mut line).map_err(io)?;
        if read == 0 {
            return Err(ClientError::ClosedByPeer(self.name));
        }
        serde_json::from_str(line.trim_end()).map_err(|source| ClientError::Json {
            target: self.name,
            source,
        })
    }
}

/// Typed stub over the same line-JSON transport.
pub struct ListsClient {
    inner: UnixClient,
}

impl ListsClient {
    pub fn connect(socket: &Path) -> Result<Self, ClientError> {
        Ok(ListsClient {
            inner: UnixClient::connect("lists", socket)?,
        })
    }
}

impl ListTransport for ListsClient {
    fn apply_changes(&self, changes: &ListChanges) -> Result<ApplyResult, ClientError> {
        let request = serde_json::to_value(changes).map_err(|source| ClientError::Json {
            target: "lists",
            source,
        })?;
        let response = self.inner.send(&request)?;
        serde_json::from_value(response).map_err(|source| ClientError::Json {
            target: "lists",
            source,
        })
    }
}

/// Connect an untyped target, degrading to `None` on failure.
pub fn connect_downstream(name: &'static str, socket: &Path) -> Option<Arc<dyn Downstream>> {
    match UnixClient::connect(name, socket) {
        Ok(client) => Some(Arc::new(client)),
        Err(err) => {
            tracing::error!(target_name = name, error = %err, "could not connect; target degraded for process lifetime");
            None
        }
    }
}

/// Connect the typed list target, degrading to `None` on failure.
pub fn connect_lists(socket: &Path) -> Option<Arc<dyn ListTransport>> {
    match ListsClient::connect(socket) {
        Ok(client) => Some(Arc::new(client)),
        Err(err) => {
            tracing::error!(target_name = "lists", error = %err, "could not connect; target degraded for process lifetime");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;

    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn connect_failure_yields_none_handle() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("nowhere.sock");
        assert!(connect_downstream("mail", &missing).is_none());
    }

    #[test]
    fn send_roundtrips_one_json_line() {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("echo.sock");
        let listener = UnixListener::bind(&socket).expect("bind");

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("read");
            let request: Value = serde_json::from_str(line.trim_end()).expect("parse");
            let reply = json!({"echo": request["type"]});
            let mut stream = stream;
            stream
                .write_all(format!("{reply}\n").as_bytes())
                .expect("write");
        });

        let client = UnixClient::connect("mail", &socket).expect("connect");
        let response = client.send(&json!({"type": "ping"})).expect("send");
        assert_eq!(response, json!({"echo": "ping"}));
        server.join().expect("server thread");
    }

    #[test]
    fn peer_hangup_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("hangup.sock");
        let listener = UnixListener::bind(&socket).expect("bind");

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            drop(stream); // close without responding
        });

        let client = UnixClient::connect("finance", &socket).expect("connect");
        let err = client
            .send(&json!({"type": "fin-get-years"}))
            .expect_err("closed peer should error");
        // Either the write or the read observes the hangup depending on timing.
        assert!(matches!(
            err,
            ClientError::ClosedByPeer(_) | ClientError::Io { .. }
        ));
        server.join().expect("server thread");
    }
}
