use std::collections::HashMap;
use std::fs::{read_dir, read_to_string};
use std::path::Path;
use serde::Deserialize;
use tracing::debug;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::recipe::Recipe;
use crate::target::Target;
use crate::template::Templates;

/// Recipe files compiled into the binary, in catalog order.
pub const BUILTIN_CATALOG: &[(&str, &str)] = &[
	("libraries.toml", include_str!("../catalog/libraries.toml")),
	("applications.toml", include_str!("../catalog/applications.toml")),
	("tools.toml", include_str!("../catalog/tools.toml"))
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
	#[serde(default, rename = "target")]
	targets: Vec<Recipe>
}

#[derive(Debug, Default)]
pub struct Registry {
	templates: Templates,
	targets: Vec<Target>,
	index: HashMap<String, usize>
}

impl Registry {
	pub fn new(templates: Templates) -> Self {
		Self {
			templates,
			..Self::default()
		}
	}

	pub fn builtin() -> Result<Self> {
		Self::from_sources(Templates::builtin()?, BUILTIN_CATALOG)
	}

	/// Built-in catalog plus every `*.toml` in the configured recipes directory.
	pub fn load(config: &Config) -> Result<Self> {
		let mut registry = Self::new(Templates::builtin()?);
		for (name, data) in BUILTIN_CATALOG {
			registry.add_source(name, data)?;
		}

		if let Some(dir) = &config.general.recipes_dir {
			registry.add_dir(dir)?;
		}

		registry.validate()?;
		Ok(registry)
	}

	pub fn from_sources(templates: Templates, sources: &[(&str, &str)]) -> Result<Self> {
		let mut registry = Self::new(templates);
		for (name, data) in sources {
			registry.add_source(name, data)?;
		}

		registry.validate()?;
		Ok(registry)
	}

	fn add_dir(&mut self, dir: &Path) -> Result<()> {
		let mut files: Vec<_> = read_dir(dir)?
			.filter_map(|entry| entry.ok())
			.map(|entry| entry.path())
			.filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
			.collect();
		files.sort();

		for path in files {
			debug!("loading recipes from {}", path.display());
			let data = read_to_string(&path)?;
			self.add_source(&path.display().to_string(), &data)?;
		}

		Ok(())
	}

	/// Parses a catalog file of `[[target]]` tables.
	pub fn add_source(&mut self, name: &str, data: &str) -> Result<()> {
		let file: CatalogFile = toml::from_str(data)
			.map_err(|e| Error::catalog(name, e))?;

		for recipe in &file.targets {
			let target = Target::from_recipe(recipe, &self.templates)?;
			self.push(target)?;
		}

		Ok(())
	}

	pub fn push(&mut self, target: Target) -> Result<()> {
		if self.index.contains_key(&target.name) {
			return Err(Error::DuplicateTarget(target.name));
		}

		self.index.insert(target.name.clone(), self.targets.len());
		self.targets.push(target);
		Ok(())
	}

	fn validate(&self) -> Result<()> {
		for target in &self.targets {
			if let Some(missing) = target.depends.iter().find(|name| !self.index.contains_key(*name)) {
				return Err(Error::catalog(&target.name, format!("depends on unknown target {}", missing)));
			}
		}
		Ok(())
	}

	pub fn templates(&self) -> &Templates {
		&self.templates
	}

	pub fn targets(&self) -> &[Target] {
		&self.targets
	}

	pub fn get(&self, name: &str) -> Option<&Target> {
		self.index.get(name).map(|&index| &self.targets[index])
	}

	/// Targets whose markers accept `dir` as their source tree.
	pub fn identify(&self, dir: &Path) -> Vec<&Target> {
		self.targets.iter().filter(|target| target.detect_in(dir)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;
	use std::fs;
	use crate::recipe::Source;
	use crate::template::BuildSystem;

	#[test]
	fn builtin_catalog_loads() {
		let registry = Registry::builtin().unwrap();

		assert!(registry.targets().len() > 70);
		for name in ["zlib-ng", "sdl2", "glib", "moltenvk", "eduke32", "nblood", "7zip", "bzip2"] {
			assert!(registry.get(name).is_some(), "{name} is missing");
		}
	}

	#[test]
	fn builtin_sources_are_pinned() {
		let registry = Registry::builtin().unwrap();
		let mut dirs = HashSet::new();

		for target in registry.targets() {
			assert!(dirs.insert(target.source_dir_name()), "{} shares a source directory", target.name);
			if let Some(Source::Archive { sha256, .. }) = &target.source {
				assert_eq!(sha256.len(), 64, "{} has a malformed checksum", target.name);
				assert!(sha256.chars().all(|c| c.is_ascii_hexdigit()));
			}
		}
	}

	#[test]
	fn builtin_recipes_pick_expected_systems() {
		let registry = Registry::builtin().unwrap();

		assert_eq!(registry.get("glib").unwrap().system, BuildSystem::Meson);
		assert_eq!(registry.get("lame").unwrap().system, BuildSystem::ConfigureMake);
		assert_eq!(registry.get("mpg123").unwrap().system, BuildSystem::CMake);
		assert_eq!(registry.get("pbzx").unwrap().system, BuildSystem::SingleExe);
		assert!(!registry.get("moltenvk").unwrap().multi_platform);
		assert!(!registry.get("radare2").unwrap().configure_prefix);
	}

	#[test]
	fn duplicates_are_rejected() {
		let data = r#"
			[[target]]
			name = "ogg"
			template = "cmake-static"

			[[target]]
			name = "ogg"
			template = "cmake-static"
		"#;

		let result = Registry::from_sources(Templates::builtin().unwrap(), &[("dup.toml", data)]);
		assert!(matches!(result, Err(Error::DuplicateTarget(name)) if name == "ogg"));
	}

	#[test]
	fn unknown_dependency_is_rejected() {
		let data = r#"
			[[target]]
			name = "vorbis"
			template = "cmake-static"
			depends = ["ogg"]
		"#;

		let result = Registry::from_sources(Templates::builtin().unwrap(), &[("vorbis.toml", data)]);
		assert!(matches!(result, Err(Error::Catalog { .. })));
	}

	#[test]
	fn identify_uses_markers() {
		let dir = tempfile::tempdir().unwrap();
		let registry = Registry::builtin().unwrap();

		fs::create_dir_all(dir.path().join("platform/Apple/bundles/EDuke32.app")).unwrap();
		fs::create_dir_all(dir.path().join("platform/Apple/bundles/NBlood.app")).unwrap();
		fs::write(dir.path().join("nblood.pk3"), "").unwrap();

		let names: Vec<_> = registry.identify(dir.path()).into_iter().map(|target| target.name.as_str()).collect();
		assert!(names.contains(&"nblood"));
		assert!(!names.contains(&"eduke32"));
	}

	#[test]
	fn recipes_dir_extends_catalog() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("extra.toml"), r#"
			[[target]]
			name = "demo"
			template = "cmake-static"
			depends = ["zlib-ng"]
		"#).unwrap();

		let mut config = Config::default();
		config.general.recipes_dir = Some(dir.path().to_path_buf());

		let registry = Registry::load(&config).unwrap();
		assert_eq!(registry.targets().last().unwrap().name, "demo");
	}
}
