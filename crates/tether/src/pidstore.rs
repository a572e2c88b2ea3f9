//! On-disk records binding an OS pid to the unit that owns it.
//!
//! One `<pid>.pid` JSON file per live child. Records outlive a hard kill of
//! the supervisor, which is what lets the reaper find orphans on next start.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const SUFFIX: &str = ".pid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidRecord {
	pub pid: u32,
	#[serde(default)]
	pub unit_id: String,
	#[serde(default)]
	pub unit_definition_id: String,
}

#[derive(Debug, Clone)]
pub struct PidStore {
	dir: PathBuf,
}

impl PidStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path_for(&self, pid: u32) -> PathBuf {
		self.dir.join(format!("{}{}", pid, SUFFIX))
	}

	pub fn record(&self, pid: u32, unit_id: &str, unit_definition_id: &str) -> Result<PidRecord> {
		std::fs::create_dir_all(&self.dir)?;
		let record = PidRecord {
			pid,
			unit_id: unit_id.to_string(),
			unit_definition_id: unit_definition_id.to_string(),
		};
		let path = self.path_for(pid);
		let content = serde_json::to_string_pretty(&record).map_err(|source| Error::Record {
			path: path.clone(),
			source,
		})?;
		std::fs::write(&path, content)?;
		tracing::debug!(pid, unit = unit_id, "pid record written");
		Ok(record)
	}

	/// Idempotent. Returns whether a record was actually removed.
	pub fn remove(&self, pid: u32) -> bool {
		match std::fs::remove_file(self.path_for(pid)) {
			Ok(()) => true,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
			Err(e) => {
				tracing::warn!(pid, "failed to remove pid record: {}", e);
				false
			}
		}
	}

	pub fn get(&self, pid: u32) -> Option<PidRecord> {
		let content = std::fs::read_to_string(self.path_for(pid)).ok()?;
		serde_json::from_str(&content).ok()
	}

	/// All persisted records. A file whose contents can't be parsed still
	/// yields a record (pid from the file name) so it can be reaped.
	pub fn list(&self) -> Result<Vec<PidRecord>> {
		let entries = match std::fs::read_dir(&self.dir) {
			Ok(e) => e,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e.into()),
		};

		let mut records = Vec::new();
		for entry in entries.flatten() {
			let name = entry.file_name().to_string_lossy().to_string();
			let Some(pid) = name.strip_suffix(SUFFIX).and_then(|s| s.parse::<u32>().ok()) else {
				continue;
			};
			let parsed = std::fs::read_to_string(entry.path())
				.ok()
				.and_then(|c| serde_json::from_str::<PidRecord>(&c).ok());
			match parsed {
				Some(record) => records.push(record),
				None => {
					tracing::warn!(pid, "unreadable pid record, keeping pid only");
					records.push(PidRecord {
						pid,
						unit_id: String::new(),
						unit_definition_id: String::new(),
					});
				}
			}
		}
		records.sort_by_key(|r| r.pid);
		Ok(records)
	}
}
