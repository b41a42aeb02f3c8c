use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use tracing::debug;
use crate::arch::Arch;
use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "depsmith.toml";

fn yes() -> bool {
	true
}

fn default_deployment_target() -> String {
	"10.15".to_string()
}

fn default_patches_dir() -> PathBuf {
	PathBuf::from("patches")
}

fn default_checks_dir() -> PathBuf {
	PathBuf::from("checks")
}

fn default_doc_dir() -> PathBuf {
	PathBuf::from("share/doc")
}

#[derive(Deserialize, Debug, Clone)]
pub struct GeneralConfig {
	#[serde(default)]
	pub build_root: PathBuf,
	#[serde(default)]
	pub threads: usize,
	#[serde(default)]
	pub architectures: Vec<Arch>,
	#[serde(default = "default_deployment_target")]
	pub deployment_target: String,
	#[serde(default = "default_patches_dir")]
	pub patches_dir: PathBuf,
	#[serde(default = "default_checks_dir")]
	pub checks_dir: PathBuf,
	#[serde(default)]
	pub recipes_dir: Option<PathBuf>,
	#[serde(default = "yes")]
	pub strip_la_files: bool,
	#[serde(default = "yes")]
	pub strip_docs: bool,
	#[serde(default = "default_doc_dir")]
	pub doc_dir: PathBuf,
	/// Extra `@KEY@` placeholders available to every recipe.
	#[serde(flatten)]
	pub others: BTreeMap<String, String>
}

impl Default for GeneralConfig {
	fn default() -> Self {
		Self {
			build_root: PathBuf::new(),
			threads: 0,
			architectures: Vec::new(),
			deployment_target: default_deployment_target(),
			patches_dir: default_patches_dir(),
			checks_dir: default_checks_dir(),
			recipes_dir: None,
			strip_la_files: true,
			strip_docs: true,
			doc_dir: default_doc_dir(),
			others: BTreeMap::new()
		}
	}
}

#[derive(Deserialize, Debug, Clone)]
pub struct BuildConfig {
	pub cc: String,
	pub cxx: String,
	#[serde(default)]
	pub cflags: String,
	#[serde(default)]
	pub cxxflags: String,
	#[serde(default)]
	pub ldflags: String,
	/// Exported verbatim into the build environment.
	#[serde(flatten)]
	pub others: BTreeMap<String, String>
}

impl Default for BuildConfig {
	fn default() -> Self {
		Self {
			cc: "clang".to_string(),
			cxx: "clang++".to_string(),
			cflags: String::new(),
			cxxflags: String::new(),
			ldflags: String::new(),
			others: BTreeMap::new()
		}
	}
}

fn tool(name: &str) -> String {
	name.to_string()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case")]
pub struct ToolsConfig {
	pub cmake: String,
	pub meson: String,
	pub make: String,
	pub pkg_config: String,
	pub git: String,
	pub curl: String,
	pub tar: String,
	pub patch: String,
	pub lipo: String
}

impl Default for ToolsConfig {
	fn default() -> Self {
		Self {
			cmake: tool("cmake"),
			meson: tool("meson"),
			make: tool("make"),
			pkg_config: tool("pkg-config"),
			git: tool("git"),
			curl: tool("curl"),
			tar: tool("tar"),
			patch: tool("patch"),
			lipo: tool("lipo")
		}
	}
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
	#[serde(default)]
	pub general: GeneralConfig,
	#[serde(default)]
	pub build: BuildConfig,
	#[serde(default)]
	pub tools: ToolsConfig
}

impl Config {
	pub fn parse(data: &str, path: &Path) -> Result<Self> {
		toml::from_str(data).map_err(|e| Error::Config {
			path: path.to_path_buf(),
			reason: e.to_string()
		})
	}

	/// Loads `path`, or `depsmith.toml` from the current directory, or falls back to defaults.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let cwd = std::env::current_dir()?;

		let path = match path {
			Some(path) => Some(path.to_path_buf()),
			None => {
				let candidate = cwd.join(CONFIG_FILE_NAME);
				candidate.exists().then_some(candidate)
			}
		};

		let Some(path) = path else {
			debug!("no {} found, using defaults", CONFIG_FILE_NAME);
			let mut config = Config::default();
			config.resolve_paths(&cwd);
			return Ok(config);
		};

		let data = read_to_string(&path).map_err(|e| Error::Config {
			path: path.clone(),
			reason: e.to_string()
		})?;

		let mut config = Self::parse(&data, &path)?;
		let abs = std::path::absolute(&path)?;
		let base = abs.parent().unwrap_or(&cwd).to_path_buf();
		config.resolve_paths(&base);

		debug!(path = %abs.display(), "loaded config");
		Ok(config)
	}

	/// Makes every relative directory absolute against `base`.
	pub fn resolve_paths(&mut self, base: &Path) {
		let general = &mut self.general;

		if matches!(general.build_root.to_str(), Some("" | ".")) {
			general.build_root = base.to_path_buf();
		} else if general.build_root.is_relative() {
			general.build_root = base.join(&general.build_root);
		}

		for dir in [&mut general.patches_dir, &mut general.checks_dir] {
			if dir.is_relative() {
				*dir = base.join(&*dir);
			}
		}

		if let Some(dir) = &mut general.recipes_dir {
			if dir.is_relative() {
				*dir = base.join(&*dir);
			}
		}
	}

	pub fn threads(&self) -> usize {
		if self.general.threads != 0 {
			return self.general.threads;
		}

		std::thread::available_parallelism()
			.map(|num| num.get())
			.unwrap_or(1)
	}

	pub fn architectures(&self) -> Vec<Arch> {
		if self.general.architectures.is_empty() {
			vec![Arch::host()]
		} else {
			self.general.architectures.clone()
		}
	}
}
