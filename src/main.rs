use std::path::PathBuf;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use depsmith::arch::Arch;
use depsmith::command::Tools;
use depsmith::config::Config;
use depsmith::pipeline::{Pipeline, RunOptions};
use depsmith::prefix;
use depsmith::registry::Registry;
use depsmith::state::Layout;

/// Builds macOS dependencies and source ports from a declarative catalog
#[derive(Parser)]
#[command(name = "depsmith")]
#[command(version, about, long_about = None)]
struct Cli {
	/// Configuration file (default: ./depsmith.toml)
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,

	/// Show build commands and their output
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Commands
}

#[derive(Subcommand)]
enum Commands {
	/// Build targets and install them into the shared prefix
	Build {
		/// Architecture to build for, may be repeated
		#[arg(short, long = "arch")]
		architectures: Vec<Arch>,

		/// Generate Xcode projects instead of building
		#[arg(long)]
		xcode: bool,

		/// Build only the named targets
		#[arg(long)]
		no_deps: bool,

		/// Run smoke tests after installing
		#[arg(long)]
		check: bool,

		#[arg(required = true)]
		targets: Vec<String>
	},

	/// List known targets
	List,

	/// Print targets recognizing a source directory
	Identify {
		dir: PathBuf
	},

	/// Remove installed targets from the shared prefix
	Remove {
		#[arg(required = true)]
		targets: Vec<String>
	}
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let default_level = if cli.verbose { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.without_time()
		.init();

	let config = Config::load(cli.config.as_deref())?;
	let registry = Registry::load(&config).context("failed to load recipe catalog")?;

	match cli.command {
		Commands::Build { architectures, xcode, no_deps, check, targets } => {
			let options = RunOptions {
				architectures,
				xcode,
				verbose: cli.verbose,
				with_dependencies: !no_deps,
				check
			};
			let tools = Tools::resolve(&config.tools);
			let mut pipeline = Pipeline::new(&registry, config, tools, options);

			let built = pipeline.run(&targets)?;
			info!("done: {}", built.join(", "));
		}
		Commands::List => {
			let layout = Layout::new(&config.general.build_root);
			for target in registry.targets() {
				let installed = if prefix::is_installed(&layout, &target.name) { "installed" } else { "" };
				println!("{:<20} {:<14} {:<16} {}",
					target.name,
					target.version.as_deref().unwrap_or("git"),
					target.system.as_str(),
					installed);
			}
		}
		Commands::Identify { dir } => {
			if !dir.is_dir() {
				bail!("{} is not a directory", dir.display());
			}

			let found = registry.identify(&dir);
			if found.is_empty() {
				bail!("no target recognizes {}", dir.display());
			}
			for target in found {
				println!("{}", target.name);
			}
		}
		Commands::Remove { targets } => {
			let layout = Layout::new(&config.general.build_root);
			for name in &targets {
				if registry.get(name).is_none() {
					warn!("{} is not in the catalog", name);
				}

				if prefix::remove(&layout, name)? {
					info!("removed {}", name);
				} else {
					warn!("{} is not installed", name);
				}
			}
		}
	}

	Ok(())
}
