//! Daemon configuration: socket endpoints and data-file locations.
//!
//! Every path defaults to a location under the memberd root directory
//! (normally `~/.memberd`); `config.yaml` in the root may override any
//! subset of them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};

pub const CONFIG_FILE: &str = "config.yaml";
pub const DAEMON_SOCKET: &str = "memberd.sock";

/// Fully resolved configuration. Construct with [`Config::default_at`] or
/// [`Config::load_or_default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for sockets, state files, and logs.
    pub root: PathBuf,

    /// Socket the daemon itself listens on.
    pub listen_socket: PathBuf,
    /// Mail/files target (postfix maps, wiki, ldap, photo moves).
    pub mail_socket: PathBuf,
    /// UNIX-accounts target (account map, storage shares, user dirs).
    pub accounts_socket: PathBuf,
    /// Finance target (query forwarding only).
    pub finance_socket: PathBuf,
    /// Mailing-list target (typed apply-changes stub).
    pub lists_socket: PathBuf,

    /// Authoritative member dataset (YAML mirror).
    pub members_file: PathBuf,
    /// Directory holding per-event photo directories.
    pub photos_dir: PathBuf,
    /// Index rebuilt by the photo scanner.
    pub photo_index_file: PathBuf,
    /// Source event list for the site agenda.
    pub events_file: PathBuf,
    /// Agenda file regenerated by `update-site-agenda`.
    pub agenda_file: PathBuf,
}

/// On-disk shape of `config.yaml`: every field optional, merged over the
/// defaults for the root it lives in.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    listen_socket: Option<PathBuf>,
    mail_socket: Option<PathBuf>,
    accounts_socket: Option<PathBuf>,
    finance_socket: Option<PathBuf>,
    lists_socket: Option<PathBuf>,
    members_file: Option<PathBuf>,
    photos_dir: Option<PathBuf>,
    photo_index_file: Option<PathBuf>,
    events_file: Option<PathBuf>,
    agenda_file: Option<PathBuf>,
}

impl Config {
    /// Defaults for a given root directory.
    pub fn default_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let run = root.join("run");
        let data = root.join("data");
        Config {
            listen_socket: run.join(DAEMON_SOCKET),
            mail_socket: run.join("mail.sock"),
            accounts_socket: run.join("accounts.sock"),
            finance_socket: run.join("finance.sock"),
            lists_socket: run.join("lists.sock"),
            members_file: data.join("members.yaml"),
            photos_dir: data.join("fotos"),
            photo_index_file: data.join("foto-index.yaml"),
            events_file: data.join("events.yaml"),
            agenda_file: data.join("agenda.yaml"),
            root,
        }
    }

    /// Load `config.yaml` from the root if present; otherwise plain defaults.
    pub fn load_or_default(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let path = root.join(CONFIG_FILE);
        let mut config = Config::default_at(root);
        if !path.exists() {
            return Ok(config);
        }
        let raw = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let overrides: RawConfig =
            serde_yaml::from_str(&raw).map_err(|source| StoreError::Parse { path, source })?;
        config.apply(overrides);
        Ok(config)
    }

    /// Directory that must exist before the daemon can bind its socket.
    pub fn run_dir(&self) -> &Path {
        self.listen_socket.parent().unwrap_or(&self.root)
    }

    fn apply(&mut self, raw: RawConfig) {
        macro_rules! merge {
            ($field:ident) => {
                if let Some(value) = raw.$field {
                    self.$field = value;
                }
            };
        }
        merge!(listen_socket);
        merge!(mail_socket);
        merge!(accounts_socket);
        merge!(finance_socket);
        merge!(lists_socket);
        merge!(members_file);
        merge!(photos_dir);
        merge!(photo_index_file);
        merge!(events_file);
        merge!(agenda_file);
    }
}
