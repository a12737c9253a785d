//! Authoritative member store — the snapshot every change-set generator
//! reads from.
//!
//! The store is a YAML file on disk mirrored into memory. `reload` re-reads
//! the file (the "refresh snapshot" step of a sync cycle); `save` writes it
//! back atomically via a temp-file rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, StoreError};
use crate::types::Member;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    members: Vec<Member>,
}

/// In-memory view of the membership dataset, keyed by login name.
#[derive(Debug)]
pub struct MemberStore {
    path: PathBuf,
    members: BTreeMap<String, Member>,
}

impl MemberStore {
    /// Load the store from `path`. A missing file yields an empty store —
    /// the daemon may start before the data mirror has been populated.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut store = MemberStore {
            path,
            members: BTreeMap::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-read the backing file, replacing the in-memory view.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        if !self.path.exists() {
            self.members.clear();
            return Ok(());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| io_err(&self.path, e))?;
        let file: StoreFile = serde_yaml::from_str(&raw).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        self.members = file
            .members
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect();
        Ok(())
    }

    /// Write the store back to disk: write `<path>.tmp`, then rename
    /// (atomic on POSIX).
    pub fn save(&self) -> Result<(), StoreError> {
        let file = StoreFile {
            members: self.members.values().cloned().collect(),
        };
        let yaml = serde_yaml::to_string(&file)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));
        fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn by_name(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Insert or replace a member record.
    pub fn insert(&mut self, member: Member) {
        self.members.insert(member.name.clone(), member);
    }

    /// Set a member's password to a fresh salted digest.
    ///
    /// The caller is responsible for calling [`MemberStore::save`] afterwards
    /// and for replicating the change to downstream account targets.
    pub fn set_password(&mut self, name: &str, password: &str) -> Result<(), StoreError> {
        let member = self
            .members
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownMember(name.to_string()))?;
        let salt = new_salt(name);
        member.password_hash = Some(hash_password(password, &salt));
        Ok(())
    }
}

impl Member {
    /// Check a cleartext password against the stored `salt$hex` digest.
    /// Members without a stored hash never authenticate.
    pub fn check_password(&self, given: &str) -> bool {
        let Some(stored) = self.password_hash.as_deref() else {
            return false;
        };
        let Some((salt, _)) = stored.split_once('$') else {
            return false;
        };
        hash_password(given, salt) == stored
    }
}

/// Digest a password with a salt: `salt$hex(sha256(salt + password))`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{salt}${}", hex::encode(hasher.finalize()))
}

fn new_salt(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(nanos.to_le_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}
