use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use tether::config::{self, HostConfig};
use tether::{reaper, PidStore, Registry};

#[tokio::main]
async fn main() {
	let args: Vec<String> = std::env::args().skip(1).collect();

	if args.is_empty() {
		print_usage();
		return;
	}

	tracing_subscriber::fmt().init();

	let config_path = flag_value(&args, "--config").map(PathBuf::from);
	let rest: Vec<&String> = positional(&args);

	let result = match args[0].as_str() {
		"help" | "--help" | "-h" => {
			print_usage();
			Ok(())
		}
		"version" | "--version" | "-V" => {
			println!("tether {}", env!("CARGO_PKG_VERSION"));
			Ok(())
		}
		"run" => match rest.get(1) {
			Some(units) => cmd_run(config_path.as_deref(), Path::new(units.as_str())).await,
			None => {
				eprintln!("usage: tether run <units.toml> [--config <path>]");
				std::process::exit(1);
			}
		},
		"reap" => cmd_reap(config_path.as_deref()),
		"records" => cmd_records(config_path.as_deref()),
		other => {
			eprintln!("{} unknown command: {}", "error:".red(), other);
			print_usage();
			std::process::exit(1);
		}
	};

	if let Err(e) = result {
		eprintln!("{} {}", "error:".red(), e);
		std::process::exit(1);
	}
}

fn print_usage() {
	eprintln!("{}", "tether - keep local processes running".bold());
	eprintln!();
	eprintln!("usage:");
	eprintln!("  tether run <units.toml>   start every unit, restart on change or crash");
	eprintln!("  tether reap               kill processes left over from a previous session");
	eprintln!("  tether records            list recorded child pids");
	eprintln!("  tether version");
	eprintln!();
	eprintln!("options:");
	eprintln!("  --config <path>           host config (default ~/.config/tether/config.toml)");
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
	args.iter()
		.position(|a| a == flag)
		.and_then(|i| args.get(i + 1))
		.cloned()
}

/// Arguments with `--flag value` pairs removed.
fn positional(args: &[String]) -> Vec<&String> {
	let mut out = Vec::new();
	let mut skip = false;
	for arg in args {
		if skip {
			skip = false;
			continue;
		}
		if arg.starts_with("--") {
			skip = true;
			continue;
		}
		out.push(arg);
	}
	out
}

fn load_config(path: Option<&Path>) -> tether::Result<HostConfig> {
	config::load_host_config(path)
}

async fn cmd_run(config_path: Option<&Path>, units_path: &Path) -> tether::Result<()> {
	let host = load_config(config_path)?;
	let (group, units) = config::load_units(units_path)?;
	let registry = Registry::open(&host).await?;

	for (unit, definition) in units {
		let id = unit.id.clone();
		match registry.start(&group, unit, definition).await {
			Ok(log) => {
				println!("{} {}", "started".green(), id.bold());
				println!("  {}", format!("> tail -f '{}' # to access the process log", log.display()).dimmed());
			}
			Err(e) => eprintln!("{} {}: {}", "failed".red(), id.bold(), e),
		}
	}

	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!("failed to listen for ctrl-c: {}", e);
	}
	tracing::info!("shutting down");
	registry.close().await;
	Ok(())
}

fn cmd_reap(config_path: Option<&Path>) -> tether::Result<()> {
	let host = load_config(config_path)?;
	let killed = reaper::reap(&PidStore::new(host.data_dir()))?;
	if killed == 0 {
		println!("no leftover processes");
	} else {
		println!("{} {} leftover process(es)", "killed".yellow(), killed);
	}
	Ok(())
}

fn cmd_records(config_path: Option<&Path>) -> tether::Result<()> {
	let host = load_config(config_path)?;
	let records = PidStore::new(host.data_dir()).list()?;
	if records.is_empty() {
		println!("{}", "no pid records".dimmed());
		return Ok(());
	}
	for record in records {
		let alive = if reaper::is_alive(record.pid) {
			"alive".green().to_string()
		} else {
			"gone".dimmed().to_string()
		};
		println!(
			"{:>8}  {:<20} {:<20} {}",
			record.pid,
			record.unit_id,
			record.unit_definition_id,
			alive
		);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn args(list: &[&str]) -> Vec<String> {
		list.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn config_flag_is_read_and_skipped() {
		let a = args(&["run", "--config", "/etc/tether.toml", "units.toml"]);
		assert_eq!(flag_value(&a, "--config").as_deref(), Some("/etc/tether.toml"));
		let rest: Vec<&str> = positional(&a).into_iter().map(String::as_str).collect();
		assert_eq!(rest, vec!["run", "units.toml"]);
	}

	#[test]
	fn missing_flag_value_is_none() {
		assert_eq!(flag_value(&args(&["reap", "--config"]), "--config"), None);
	}
}
