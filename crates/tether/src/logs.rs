use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

pub fn unit_log_path(log_dir: &Path, unit_id: &str) -> PathBuf {
	log_dir.join(format!("{}.log", unit_id))
}

/// Append-only log file shared by a unit's child and its supervisor.
#[derive(Debug)]
pub struct UnitLog {
	path: PathBuf,
	file: File,
}

impl UnitLog {
	pub fn open(path: &Path) -> std::io::Result<Self> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		let file = OpenOptions::new().create(true).append(true).open(path)?;
		Ok(Self {
			path: path.to_path_buf(),
			file,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// A handle for one of the child's output streams.
	pub fn stdio(&self) -> std::io::Result<Stdio> {
		Ok(Stdio::from(self.file.try_clone()?))
	}

	/// Supervisor banner line, best effort.
	pub fn note(&self, msg: &str) {
		let line = format!("[tether] {}\n", msg);
		if let Err(e) = (&self.file).write_all(line.as_bytes()) {
			tracing::debug!(path = %self.path.display(), "log write failed: {}", e);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn log_path_is_named_after_unit() {
		assert_eq!(unit_log_path(Path::new("/var/log/tether"), "web"), PathBuf::from("/var/log/tether/web.log"));
	}

	#[test]
	fn notes_append_and_never_truncate() {
		let dir = std::env::temp_dir().join(format!("tether-logs-{}", std::process::id()));
		let path = unit_log_path(&dir, "append");
		let _ = fs::remove_file(&path);

		UnitLog::open(&path).unwrap().note("first");
		UnitLog::open(&path).unwrap().note("second");

		let text = fs::read_to_string(&path).unwrap();
		assert_eq!(text, "[tether] first\n[tether] second\n");
		let _ = fs::remove_dir_all(&dir);
	}
}
