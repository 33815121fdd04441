use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Saves frames as `snapshot_<YYYYMMDD_HHMMSS>.<ext>`.
///
/// Names never repeat within a run and never overwrite an existing file:
/// a clash gets a `_<n>` suffix.
pub struct SnapshotWriter {
    dir: PathBuf,
    extension: String,
    last_stamp: String,
    counter: u32,
}

impl SnapshotWriter {
    pub fn new<P: AsRef<Path>>(dir: P, extension: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            last_stamp: String::new(),
            counter: 0,
        }
    }

    pub fn save(&mut self, frame: &RgbImage) -> Result<PathBuf> {
        self.save_at(frame, Local::now().naive_local())
    }

    pub fn save_at(&mut self, frame: &RgbImage, now: NaiveDateTime) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create snapshot directory {}", self.dir.display())
        })?;

        let path = self.next_path(now);
        frame
            .save(&path)
            .with_context(|| format!("Failed to save snapshot {}", path.display()))?;

        tracing::info!("Snapshot saved as {}", path.display());
        Ok(path)
    }

    fn next_path(&mut self, now: NaiveDateTime) -> PathBuf {
        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        if stamp == self.last_stamp {
            self.counter += 1;
        } else {
            self.last_stamp = stamp;
            self.counter = 0;
        }

        loop {
            let name = if self.counter == 0 {
                format!("snapshot_{}.{}", self.last_stamp, self.extension)
            } else {
                format!("snapshot_{}_{}.{}", self.last_stamp, self.counter, self.extension)
            };
            let path = self.dir.join(name);
            if !path.exists() {
                return path;
            }
            self.counter += 1;
        }
    }
}
