//! Debounced filesystem change notifications.
//!
//! ```text
//! notify callback → ignore filter → channel → burst debounce → armed gate → changed()
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Quiet gap that ends a burst of raw events.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Dotfiles and dependency caches never trigger restarts.
const DEFAULT_IGNORES: [&str; 2] = [r"[/\\]\.", r"[/\\](node_modules|bower_components)([/\\]|$)"];

#[derive(Debug, Clone)]
pub struct IgnoreSet {
	root: PathBuf,
	patterns: Vec<Regex>,
}

impl IgnoreSet {
	/// Patterns match paths relative to `root`, rendered with a leading `/`.
	pub fn new(root: impl Into<PathBuf>, extra: &[String]) -> Result<Self> {
		let mut patterns = Vec::with_capacity(DEFAULT_IGNORES.len() + extra.len());
		for pattern in DEFAULT_IGNORES.iter().copied().chain(extra.iter().map(String::as_str)) {
			let re = Regex::new(pattern).map_err(|source| Error::Pattern {
				pattern: pattern.to_string(),
				source,
			})?;
			patterns.push(re);
		}
		Ok(Self {
			root: root.into(),
			patterns,
		})
	}

	pub fn is_ignored(&self, path: &Path) -> bool {
		let candidate = match path.strip_prefix(&self.root) {
			Ok(rel) => format!("/{}", rel.display()),
			Err(_) => path.display().to_string(),
		};
		self.patterns.iter().any(|re| re.is_match(&candidate))
	}
}

pub struct ChangeWatcher {
	rx: mpsc::UnboundedReceiver<PathBuf>,
	armed_at: Option<Instant>,
	// dropping this releases the OS watches
	_watcher: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
	pub fn watch(paths: &[PathBuf], ignore: IgnoreSet) -> Result<Self> {
		let (tx, rx) = mpsc::unbounded_channel();

		let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
			let event = match res {
				Ok(event) => event,
				Err(e) => {
					tracing::warn!("watch error: {}", e);
					return;
				}
			};
			if !is_content_change(&event.kind) {
				return;
			}
			for path in event.paths {
				if ignore.is_ignored(&path) {
					tracing::trace!(path = %path.display(), "ignored change");
					continue;
				}
				let _ = tx.send(path);
			}
		})?;

		for path in paths {
			if let Err(e) = watcher.watch(path, RecursiveMode::Recursive) {
				tracing::warn!(path = %path.display(), "cannot watch: {}", e);
			}
		}

		Ok(Self {
			rx,
			armed_at: None,
			_watcher: Some(watcher),
		})
	}

	#[cfg(test)]
	pub(crate) fn from_channel(rx: mpsc::UnboundedReceiver<PathBuf>) -> Self {
		Self {
			rx,
			armed_at: None,
			_watcher: None,
		}
	}

	/// Deliver changes whose burst settles after `quiet` from now.
	/// Anything queued while disarmed is dropped.
	pub fn arm(&mut self, quiet: Duration) {
		while self.rx.try_recv().is_ok() {}
		self.armed_at = Some(Instant::now() + quiet);
	}

	pub fn disarm(&mut self) {
		self.armed_at = None;
	}

	fn is_armed(&self) -> bool {
		self.armed_at.is_some_and(|at| Instant::now() >= at)
	}

	/// Next debounced change, reported by the last path of its burst.
	/// `None` once the event source is gone.
	pub async fn changed(&mut self) -> Option<PathBuf> {
		loop {
			let path = next_burst(&mut self.rx, DEBOUNCE_WINDOW).await?;
			if self.is_armed() {
				return Some(path);
			}
			tracing::debug!(path = %path.display(), "change suppressed during quiet period");
		}
	}
}

async fn next_burst(rx: &mut mpsc::UnboundedReceiver<PathBuf>, window: Duration) -> Option<PathBuf> {
	let mut last = rx.recv().await?;
	loop {
		match tokio::time::timeout(window, rx.recv()).await {
			Ok(Some(path)) => last = path,
			Ok(None) | Err(_) => return Some(last),
		}
	}
}

fn is_content_change(kind: &EventKind) -> bool {
	match kind {
		EventKind::Create(_) | EventKind::Remove(_) => true,
		// mtime/chmod noise
		EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => false,
		EventKind::Modify(_) => true,
		_ => false,
	}
}
