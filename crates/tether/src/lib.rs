//! # tether
//!
//! Local process supervisor. Keeps one child process per unit alive,
//! restarts it when watched files change or when it crashes, and records
//! every child's pid on disk so a later session can reap orphans left by a
//! supervisor that died hard.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tether::{HostConfig, Registry, Unit, UnitDefinition};
//!
//! # #[tokio::main]
//! # async fn main() -> tether::Result<()> {
//! let registry = Registry::open(&HostConfig::default()).await?;
//!
//! let unit = Unit {
//!     id: "web".into(),
//!     name: "web".into(),
//!     definition_id: "web".into(),
//!     ignored: vec![],
//! };
//! let definition = UnitDefinition {
//!     id: "web".into(),
//!     command: "node server.js".into(),
//!     working_dir: "/srv/web".into(),
//!     cwd: None,
//!     watch: vec!["src".into()],
//!     ignored: vec![],
//! };
//!
//! let log = registry.start("dev", unit, definition).await?;
//! println!("tail -f '{}'", log.display());
//!
//! registry.close().await;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod logs;
pub mod monitor;
pub mod paths;
pub mod pidstore;
pub mod reaper;
pub mod registry;
pub mod types;
pub mod watcher;

pub use config::HostConfig;
pub use error::{Error, Result};
pub use monitor::{Monitor, MonitorSpec};
pub use pidstore::{PidRecord, PidStore};
pub use registry::{Deployed, Registry};
pub use types::*;
pub use watcher::{ChangeWatcher, IgnoreSet};
