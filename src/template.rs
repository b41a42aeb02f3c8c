use std::collections::HashMap;
use serde::Deserialize;
use crate::error::{Error, Result};
use crate::options::FlagStyle;

pub const BUILTIN_TEMPLATES: &str = include_str!("../catalog/templates.toml");

/// External build system that drives a target.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSystem {
	#[serde(rename = "cmake")]
	CMake,
	#[serde(rename = "meson")]
	Meson,
	#[serde(rename = "configure-make")]
	ConfigureMake,
	#[serde(rename = "make")]
	Make,
	#[serde(rename = "single-exe")]
	SingleExe,
	#[serde(rename = "custom")]
	Custom
}

impl BuildSystem {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::CMake => "cmake",
			Self::Meson => "meson",
			Self::ConfigureMake => "configure-make",
			Self::Make => "make",
			Self::SingleExe => "single-exe",
			Self::Custom => "custom"
		}
	}

	pub fn flag_style(&self) -> FlagStyle {
		match self {
			Self::CMake => FlagStyle::CMake,
			Self::Meson => FlagStyle::Meson,
			Self::ConfigureMake => FlagStyle::Configure,
			Self::Make | Self::SingleExe | Self::Custom => FlagStyle::Make
		}
	}

	/// Build file looked for in `src_root` when a recipe declares no markers.
	pub fn default_marker(&self) -> Option<&'static str> {
		match self {
			Self::CMake => Some("CMakeLists.txt"),
			Self::Meson => Some("meson.build"),
			Self::ConfigureMake => Some("configure"),
			Self::Make => Some("Makefile"),
			Self::SingleExe | Self::Custom => None
		}
	}
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct RawTemplate {
	system: Option<BuildSystem>,
	inherits: Option<String>,
	#[serde(default)]
	options: toml::Table,
	install: Option<bool>,
	fix_pkg_config: Option<bool>,
	copy_outputs: Option<bool>,
	multi_platform: Option<bool>,
	configure_prefix: Option<bool>,
	detect: Option<Vec<String>>
}

#[derive(Debug, Clone)]
pub struct Template {
	pub name: String,
	pub system: BuildSystem,
	/// Default options, applied before the recipe's own.
	pub options: toml::Table,
	pub install: bool,
	pub fix_pkg_config: bool,
	pub copy_outputs: bool,
	pub multi_platform: bool,
	pub configure_prefix: bool,
	pub detect: Vec<String>
}

impl Template {
	/// Bare template for targets driven entirely by hooks.
	pub fn custom() -> Self {
		Self {
			name: "custom".to_string(),
			system: BuildSystem::Custom,
			options: toml::Table::new(),
			install: false,
			fix_pkg_config: false,
			copy_outputs: false,
			multi_platform: true,
			configure_prefix: true,
			detect: Vec::new()
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct Templates {
	pub templates: HashMap<String, Template>
}

impl Templates {
	pub fn builtin() -> Result<Self> {
		Self::parse("templates.toml", BUILTIN_TEMPLATES)
	}

	pub fn parse(name: &str, data: &str) -> Result<Self> {
		let raw: HashMap<String, RawTemplate> = toml::from_str(data)
			.map_err(|e| Error::catalog(name, e))?;

		let mut templates = HashMap::new();
		for key in raw.keys() {
			let mut chain = Vec::new();
			let template = resolve(name, key, &raw, &mut chain)?;
			templates.insert(key.clone(), template);
		}

		Ok(Self { templates })
	}

	pub fn get(&self, name: &str) -> Option<&Template> {
		self.templates.get(name)
	}
}

fn resolve(
	file: &str,
	key: &str,
	raw: &HashMap<String, RawTemplate>,
	chain: &mut Vec<String>) -> Result<Template> {
	if chain.iter().any(|name| name == key) {
		return Err(Error::catalog(file, format!("template {} inherits from itself", key)));
	}

	let Some(current) = raw.get(key) else {
		let child = chain.last().cloned().unwrap_or_default();
		return Err(Error::UnknownTemplate { recipe: child, template: key.to_string() });
	};

	chain.push(key.to_string());

	let mut template = match &current.inherits {
		Some(parent) => resolve(file, parent, raw, chain)?,
		None => {
			let Some(system) = current.system else {
				return Err(Error::catalog(file, format!("template {} has no build system", key)));
			};

			Template {
				system,
				..Template::custom()
			}
		}
	};

	chain.pop();

	template.name = key.to_string();
	if let Some(system) = current.system {
		template.system = system;
	}
	for (option, value) in &current.options {
		template.options.insert(option.clone(), value.clone());
	}
	template.install = current.install.unwrap_or(template.install);
	template.fix_pkg_config = current.fix_pkg_config.unwrap_or(template.fix_pkg_config);
	template.copy_outputs = current.copy_outputs.unwrap_or(template.copy_outputs);
	template.multi_platform = current.multi_platform.unwrap_or(template.multi_platform);
	template.configure_prefix = current.configure_prefix.unwrap_or(template.configure_prefix);
	if let Some(detect) = &current.detect {
		template.detect = detect.clone();
	}

	Ok(template)
}
