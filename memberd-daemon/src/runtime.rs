//! Daemon runtime: the serving loop around the command dispatcher.
//!
//! One tokio task accepts connections on the daemon socket; each connection
//! reads newline-delimited JSON requests and feeds them to the dispatcher on
//! the blocking pool. Distinct connections dispatch concurrently and race on
//! the dispatcher's operation lock.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use memberd_core::{Config, MemberStore};
use memberd_sync::Orchestrator;

use crate::actions::{build_actions, write_store};
use crate::agenda::FileAgenda;
use crate::client::{connect_downstream, connect_lists};
use crate::dispatcher::{Clients, Dispatcher};
use crate::error::{io_err, DaemonError};
use crate::fotos::DirScanner;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: Config) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon runtime.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&config)?;
    let dispatcher = Arc::new(build_dispatcher(&config)?);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(config, dispatcher, shutdown.clone(), shutdown.subscribe())
                    .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Construct the orchestrator context once at process start: member store,
/// downstream handles, sync actions, local collaborators.
fn build_dispatcher(config: &Config) -> Result<Dispatcher, DaemonError> {
    let store = Arc::new(RwLock::new(MemberStore::load(&config.members_file)?));

    let clients = Clients {
        mail: connect_downstream("mail", &config.mail_socket),
        accounts: connect_downstream("accounts", &config.accounts_socket),
        finance: connect_downstream("finance", &config.finance_socket),
    };
    let lists = connect_lists(&config.lists_socket);

    let actions = build_actions(
        store.clone(),
        clients.mail.clone(),
        clients.accounts.clone(),
        lists,
    );
    let refresh_store = store.clone();
    let orchestrator = Orchestrator::new(
        actions,
        move || {
            write_store(&refresh_store).reload()?;
            Ok(())
        },
        Arc::new(memberd_sync::SyncState::default()),
    );

    Ok(Dispatcher::new(
        store,
        orchestrator,
        clients,
        Box::new(DirScanner::new(config)),
        Box::new(FileAgenda::new(config)),
    ))
}

async fn socket_server_task(
    config: Config,
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = &config.listen_socket;
    prepare_socket_for_bind(socket)?;

    let listener = UnixListener::bind(socket).map_err(|e| io_err(socket, e))?;
    set_socket_permissions(socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(socket, e))?;
                let dispatcher = dispatcher.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(dispatcher, stream, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(socket);
    }
    Ok(())
}

/// Serve one connection: decode request, dispatch, encode response.
///
/// Unrecognized kinds produce no payload from the dispatcher; a JSON `null`
/// line keeps the request/response channel aligned.
pub async fn serve_connection(
    dispatcher: Arc<Dispatcher>,
    stream: UnixStream,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_line(&mut writer, &json!({"error": format!("invalid request JSON: {err}")}))
                    .await?;
                continue;
            }
        };

        if request.get("type").and_then(Value::as_str) == Some("stop") {
            let _ = shutdown_tx.send(());
            write_line(&mut writer, &json!({"stopping": true})).await?;
            break;
        }

        let dispatcher = dispatcher.clone();
        let response = tokio::task::spawn_blocking(move || dispatcher.dispatch(request))
            .await
            .map_err(|err| DaemonError::Protocol(format!("dispatch join error: {err}")))?;
        write_line(&mut writer, &response.unwrap_or(Value::Null)).await?;
    }

    Ok(())
}

async fn write_line(writer: &mut OwnedWriteHalf, response: &Value) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(config: &Config) -> Result<(), DaemonError> {
    let run = config.run_dir();
    if !run.exists() {
        fs::create_dir_all(run).map_err(|e| io_err(run, e))?;
    }
    if let Some(data) = config.members_file.parent() {
        if !data.exists() {
            fs::create_dir_all(data).map_err(|e| io_err(data, e))?;
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
