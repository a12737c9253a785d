//! Site-agenda refresher.
//!
//! Reads the event source file, keeps events dated today or later, and
//! regenerates the published agenda file.

use std::fs;
use std::path::PathBuf;

use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use memberd_core::{Config, Event};

use crate::error::{io_err, DaemonError};

/// Refresh the published agenda, returning the structured command response.
pub trait AgendaRefresher: Send + Sync {
    fn update(&self) -> Value;
}

/// File-based refresher: `events.yaml` in, `agenda.yaml` out.
pub struct FileAgenda {
    events_file: PathBuf,
    agenda_file: PathBuf,
}

#[derive(Debug, Serialize)]
struct AgendaFile {
    generated_at: chrono::DateTime<Utc>,
    upcoming: Vec<Event>,
}

impl FileAgenda {
    pub fn new(config: &Config) -> Self {
        FileAgenda {
            events_file: config.events_file.clone(),
            agenda_file: config.agenda_file.clone(),
        }
    }

    fn refresh(&self, today: NaiveDate) -> Result<usize, DaemonError> {
        let mut upcoming = if self.events_file.exists() {
            let raw =
                fs::read_to_string(&self.events_file).map_err(|e| io_err(&self.events_file, e))?;
            let events: Vec<Event> = serde_yaml::from_str(&raw)?;
            events.into_iter().filter(|e| e.date >= today).collect()
        } else {
            Vec::new()
        };
        upcoming.sort_by_key(|e| e.date);

        let count = upcoming.len();
        let agenda = AgendaFile {
            generated_at: Utc::now(),
            upcoming,
        };
        if let Some(parent) = self.agenda_file.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let yaml = serde_yaml::to_string(&agenda)?;
        fs::write(&self.agenda_file, yaml).map_err(|e| io_err(&self.agenda_file, e))?;
        Ok(count)
    }
}

impl AgendaRefresher for FileAgenda {
    fn update(&self) -> Value {
        match self.refresh(Local::now().date_naive()) {
            Ok(upcoming) => {
                tracing::info!(upcoming, "site agenda refreshed");
                json!({"success": true, "upcoming": upcoming})
            }
            Err(err) => {
                tracing::error!(error = %err, "site agenda refresh failed");
                json!({"error": err.to_string()})
            }
        }
    }
}
