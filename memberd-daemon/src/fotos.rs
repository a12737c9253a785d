//! Local photo collection scanner.
//!
//! Walks the per-event photo directories and rebuilds the photo index file.
//! Used by `fotoadmin-scan-fotos` and as step 2 of the move-fotos saga.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};

use memberd_core::Config;

use crate::error::{io_err, DaemonError};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Re-scan the photo collection, returning the structured command response:
/// `{"success": true, ...}` or `{"error": ...}`.
pub trait PhotoScanner: Send + Sync {
    fn scan(&self) -> Value;
}

/// Directory-walking scanner writing `foto-index.yaml`.
pub struct DirScanner {
    photos_dir: PathBuf,
    index_file: PathBuf,
}

impl DirScanner {
    pub fn new(config: &Config) -> Self {
        DirScanner {
            photos_dir: config.photos_dir.clone(),
            index_file: config.photo_index_file.clone(),
        }
    }

    fn rebuild_index(&self) -> Result<(usize, usize), DaemonError> {
        let mut index = BTreeMap::<String, Vec<String>>::new();

        if self.photos_dir.exists() {
            for entry in
                fs::read_dir(&self.photos_dir).map_err(|e| io_err(&self.photos_dir, e))?
            {
                let entry = entry.map_err(|e| io_err(&self.photos_dir, e))?;
                if !entry.file_type().map_err(|e| io_err(entry.path(), e))?.is_dir() {
                    continue;
                }
                let event = entry.file_name().to_string_lossy().to_string();
                let mut fotos = list_images(&entry.path())?;
                fotos.sort();
                index.insert(event, fotos);
            }
        }

        let events = index.len();
        let fotos = index.values().map(Vec::len).sum();

        if let Some(parent) = self.index_file.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let yaml = serde_yaml::to_string(&index)?;
        fs::write(&self.index_file, yaml).map_err(|e| io_err(&self.index_file, e))?;

        Ok((events, fotos))
    }
}

impl PhotoScanner for DirScanner {
    fn scan(&self) -> Value {
        match self.rebuild_index() {
            Ok((events, fotos)) => {
                tracing::info!(events, fotos, "photo scan finished");
                json!({"success": true, "events": events, "fotos": fotos})
            }
            Err(err) => {
                tracing::error!(error = %err, "photo scan failed");
                json!({"error": err.to_string()})
            }
        }
    }
}

fn list_images(dir: &std::path::Path) -> Result<Vec<String>, DaemonError> {
    let mut fotos = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            fotos.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    Ok(fotos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scanner_at(root: &std::path::Path) -> DirScanner {
        DirScanner {
            photos_dir: root.join("fotos"),
            index_file: root.join("foto-index.yaml"),
        }
    }

    #[test]
    fn scan_counts_events_and_images() {
        let root = TempDir::new().expect("root");
        let intro = root.path().join("fotos/intro2026");
        fs::create_dir_all(&intro).expect("mkdir");
        fs::write(intro.join("dsc001.jpg"), b"x").expect("write");
        fs::write(intro.join("dsc002.JPG"), b"x").expect("write");
        fs::write(intro.join("notes.txt"), b"x").expect("write");
        fs::create_dir_all(root.path().join("fotos/gala")).expect("mkdir");

        let result = scanner_at(root.path()).scan();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["events"], json!(2));
        assert_eq!(result["fotos"], json!(2), "non-images are skipped");

        let yaml = fs::read_to_string(root.path().join("foto-index.yaml")).expect("index");
        let index: BTreeMap<String, Vec<String>> =
            serde_yaml::from_str(&yaml).expect("parse index");
        assert_eq!(index["intro2026"].len(), 2);
        assert!(index["gala"].is_empty());
    }

    #[test]
    fn scan_with_missing_photos_dir_succeeds_empty() {
        let root = TempDir::new().expect("root");
        let result = scanner_at(root.path()).scan();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["events"], json!(0));
    }
}
