use std::collections::HashSet;
use tracing::{info, warn};
use crate::arch::Arch;
use crate::check;
use crate::command::Tools;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fsutil::recreate_dir;
use crate::prefix;
use crate::registry::Registry;
use crate::state::{BuildFlags, BuildState};
use crate::system;
use crate::target::Target;
use crate::universal;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
	/// Empty means the configured architectures.
	pub architectures: Vec<Arch>,
	pub xcode: bool,
	pub verbose: bool,
	pub with_dependencies: bool,
	pub check: bool
}

/// Builds targets one after another against a shared prefix.
pub struct Pipeline<'a> {
	registry: &'a Registry,
	state: BuildState,
	options: RunOptions
}

impl<'a> Pipeline<'a> {
	pub fn new(registry: &'a Registry, config: Config, tools: Tools, options: RunOptions) -> Self {
		let flags = BuildFlags {
			xcode: options.xcode,
			verbose: options.verbose
		};

		Self {
			registry,
			state: BuildState::new(config, tools, flags),
			options
		}
	}

	pub fn state(&self) -> &BuildState {
		&self.state
	}

	/// Requested targets in build order. Dependencies come first when enabled;
	/// every target appears once.
	pub fn plan(&self, names: &[String]) -> Result<Vec<&'a Target>> {
		let mut order = Vec::new();
		let mut done = HashSet::new();
		let mut visiting = Vec::new();

		for name in names {
			self.visit(name, &mut order, &mut done, &mut visiting)?;
		}

		Ok(order)
	}

	fn visit(
		&self,
		name: &str,
		order: &mut Vec<&'a Target>,
		done: &mut HashSet<String>,
		visiting: &mut Vec<String>) -> Result<()> {
		if done.contains(name) {
			return Ok(());
		}
		if visiting.iter().any(|entry| entry == name) {
			return Err(Error::DependencyCycle(name.to_string()));
		}

		let registry = self.registry;
		let target = registry.get(name)
			.ok_or_else(|| Error::UnknownTarget(name.to_string()))?;

		if self.options.with_dependencies {
			visiting.push(name.to_string());
			for dependency in &target.depends {
				self.visit(dependency, order, done, visiting)?;
			}
			visiting.pop();
		}

		done.insert(name.to_string());
		order.push(target);
		Ok(())
	}

	/// Host first, so that a native build exists before any cross pass.
	fn architectures(&self, target: &Target) -> Vec<Arch> {
		let host = Arch::host();
		if !target.multi_platform {
			return vec![host];
		}

		let mut archs = if self.options.architectures.is_empty() {
			self.state.config.architectures()
		} else {
			self.options.architectures.clone()
		};

		let mut seen = HashSet::new();
		archs.retain(|arch| seen.insert(*arch));
		archs.sort_by_key(|arch| *arch != host);
		archs
	}

	/// Runs every planned target to completion before starting the next one.
	/// Returns the names in the order they were built.
	pub fn run(&mut self, names: &[String]) -> Result<Vec<String>> {
		let plan = self.plan(names)?;
		let mut built = Vec::new();

		for target in plan {
			self.run_target(target)?;
			built.push(target.name.clone());
		}

		Ok(built)
	}

	fn run_target(&mut self, target: &Target) -> Result<()> {
		let archs = self.architectures(target);
		let state = &mut self.state;

		info!("building {} for {}", target.name,
			archs.iter().map(Arch::as_str).collect::<Vec<_>>().join(", "));

		state.repoint(target, Arch::host());
		target.prepare_source(state)?;
		if !target.detect(state) {
			return Err(Error::catalog(
				&target.name,
				format!("{} is not recognized as its source", state.source.display())));
		}

		system::ensure_tools(target, state)?;

		for &arch in &archs {
			state.repoint(target, arch);
			recreate_dir(&state.build_path)?;
			recreate_dir(&state.install_path)?;
			state.ensure_paths()?;

			info!("configuring {} ({})", target.name, arch);
			target.configure(state)?;

			if state.xcode {
				info!("generated project in {}", state.build_path.display());
				continue;
			}

			info!("building {} ({})", target.name, arch);
			target.build(state)?;

			info!("installing {} ({})", target.name, arch);
			target.post_build(state)?;
		}

		if state.xcode {
			return Ok(());
		}

		let tree = universal::merge(state, &target.name, &archs)?;
		prefix::sync(&state.layout, &state.config.general, &target.name, &tree)?;

		if self.options.check {
			match &target.check {
				Some(spec) => {
					state.repoint(target, Arch::host());
					check::run(state, &target.name, spec)?;
				}
				None => warn!("{} has no smoke test", target.name)
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::template::Template;

	fn registry(targets: &[(&str, &str)]) -> Registry {
		let mut registry = Registry::default();
		for (name, depends) in targets {
			registry.push(Target::new(*name, Template::custom()).with_depends(depends.split_whitespace())).unwrap();
		}
		registry
	}

	fn pipeline(registry: &Registry, with_dependencies: bool) -> Pipeline<'_> {
		let options = RunOptions {
			with_dependencies,
			..RunOptions::default()
		};
		Pipeline::new(registry, Config::default(), Tools::default(), options)
	}

	fn names(plan: Vec<&Target>) -> Vec<&str> {
		plan.into_iter().map(|target| target.name.as_str()).collect()
	}

	#[test]
	fn plan_orders_dependencies_first() {
		let registry = registry(&[
			("ogg", ""),
			("vorbis", "ogg"),
			("flac", "ogg"),
			("sndfile", "flac vorbis opus"),
			("opus", "")
		]);
		let pipeline = pipeline(&registry, true);

		let plan = pipeline.plan(&["sndfile".to_string(), "ogg".to_string()]).unwrap();
		assert_eq!(names(plan), vec!["ogg", "flac", "vorbis", "opus", "sndfile"]);
	}

	#[test]
	fn plan_without_dependencies_keeps_request() {
		let registry = registry(&[("ogg", ""), ("vorbis", "ogg")]);
		let pipeline = pipeline(&registry, false);

		let plan = pipeline.plan(&["vorbis".to_string(), "vorbis".to_string()]).unwrap();
		assert_eq!(names(plan), vec!["vorbis"]);
	}

	#[test]
	fn plan_detects_cycles() {
		let registry = registry(&[("a", "b"), ("b", "c"), ("c", "a")]);
		let pipeline = pipeline(&registry, true);

		assert!(matches!(pipeline.plan(&["a".to_string()]), Err(Error::DependencyCycle(name)) if name == "a"));
	}

	#[test]
	fn plan_rejects_unknown_targets() {
		let registry = registry(&[("a", "missing")]);
		let pipeline = pipeline(&registry, true);

		assert!(matches!(pipeline.plan(&["a".to_string()]), Err(Error::UnknownTarget(name)) if name == "missing"));
	}

	#[test]
	fn single_platform_target_builds_for_host_only() {
		let registry = Registry::default();
		let options = RunOptions {
			architectures: vec![Arch::X86_64, Arch::Arm64],
			..RunOptions::default()
		};
		let pipeline = Pipeline::new(&registry, Config::default(), Tools::default(), options);

		let universal = Target::new("sdl2", Template::custom());
		assert_eq!(pipeline.architectures(&universal)[0], Arch::host());
		assert_eq!(pipeline.architectures(&universal).len(), 2);

		let native = Target::new("moltenvk", Template::custom()).with_multi_platform(false);
		assert_eq!(pipeline.architectures(&native), vec![Arch::host()]);
	}
}
