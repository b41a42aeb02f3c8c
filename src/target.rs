use std::collections::BTreeMap;
use std::fs::{create_dir_all, read_dir};
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};
use crate::arch::Arch;
use crate::command::ToolCommand;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::fsutil::remove_path;
use crate::placeholder::Expander;
use crate::postbuild;
use crate::recipe::{
	CheckSpec, Detect, Output, PatchRule, PostAction, Recipe, RecipeCommand, Source, Stage, WorkDir
};
use crate::state::BuildState;
use crate::system;
use crate::template::{BuildSystem, Template, Templates};
use crate::textpatch::LineEditor;

/// Adjusts options or environment before the build system is configured.
pub type ConfigureHook = Box<dyn Fn(&mut BuildState, &Expander) -> Result<()>>;
/// Runs after installation, with the install directory populated.
pub type PostBuildHook = Box<dyn Fn(&BuildState, &Expander) -> Result<()>>;

/// A named, versioned build unit. Everything target specific is data or an
/// ordered list of hooks; the lifecycle itself is shared.
pub struct Target {
	pub name: String,
	pub version: Option<String>,
	pub source: Option<Source>,
	pub src_root: String,
	pub system: BuildSystem,
	pub multi_platform: bool,
	pub deployment_target: bool,
	pub install: bool,
	pub fix_pkg_config: bool,
	pub copy_outputs: bool,
	pub configure_prefix: bool,
	pub tool: Option<String>,
	pub outputs: Vec<Output>,
	pub depends: Vec<String>,
	pub detect: Detect,
	pub vars: BTreeMap<String, String>,
	pub arch_vars: BTreeMap<Arch, BTreeMap<String, String>>,
	pub commands: Vec<RecipeCommand>,
	pub pkg_config_rules: Vec<PatchRule>,
	pub pkg_config_hook: Option<Rc<LineEditor>>,
	pub post_actions: Vec<PostAction>,
	pub check: Option<CheckSpec>,
	default_markers: Vec<String>,
	configure_hooks: Vec<ConfigureHook>,
	post_build_hooks: Vec<PostBuildHook>
}

impl std::fmt::Debug for Target {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Target")
			.field("name", &self.name)
			.field("version", &self.version)
			.field("system", &self.system)
			.field("depends", &self.depends)
			.finish_non_exhaustive()
	}
}

fn parse_arch(target: &str, key: &str) -> Result<Arch> {
	key.parse().map_err(|e: String| Error::catalog(target, e))
}

impl Target {
	pub fn new(name: impl Into<String>, template: Template) -> Self {
		let name = name.into();

		let mut default_markers = template.detect.clone();
		if default_markers.is_empty() {
			default_markers.extend(template.system.default_marker().map(str::to_string));
		}

		let target = Self {
			name,
			version: None,
			source: None,
			src_root: String::new(),
			system: template.system,
			multi_platform: template.multi_platform,
			deployment_target: true,
			install: template.install,
			fix_pkg_config: template.fix_pkg_config,
			copy_outputs: template.copy_outputs,
			configure_prefix: template.configure_prefix,
			tool: None,
			outputs: Vec::new(),
			depends: Vec::new(),
			detect: Detect::default(),
			vars: BTreeMap::new(),
			arch_vars: BTreeMap::new(),
			commands: Vec::new(),
			pkg_config_rules: Vec::new(),
			pkg_config_hook: None,
			post_actions: Vec::new(),
			check: None,
			default_markers,
			configure_hooks: Vec::new(),
			post_build_hooks: Vec::new()
		};

		if template.options.is_empty() {
			target
		} else {
			target.with_options(template.options)
		}
	}

	pub fn from_recipe(recipe: &Recipe, templates: &Templates) -> Result<Self> {
		let template = templates.get(&recipe.template)
			.ok_or_else(|| Error::UnknownTemplate {
				recipe: recipe.name.clone(),
				template: recipe.template.clone()
			})?;

		let name = recipe.name.as_str();
		let mut target = Target::new(name, template.clone());

		target.version = recipe.version.clone();
		target.source = recipe.source.clone();
		target.src_root = recipe.src_root.clone();
		target.deployment_target = recipe.deployment_target;
		target.tool = recipe.tool.clone();
		target.outputs = recipe.outputs.clone();
		target.depends = recipe.depends.clone();
		target.detect = recipe.detect.clone().unwrap_or_default();
		target.vars = recipe.vars.clone();
		target.commands = recipe.commands.clone();
		target.pkg_config_rules = recipe.pkg_config.clone();
		target.post_actions = recipe.post_build.clone();
		target.check = recipe.check.clone();

		if !recipe.outputs.is_empty() {
			target.copy_outputs = true;
		}
		if let Some(value) = recipe.multi_platform {
			target.multi_platform = value;
		}
		if let Some(value) = recipe.install {
			target.install = value;
		}
		if let Some(value) = recipe.configure_prefix {
			target.configure_prefix = value;
		}

		for (key, vars) in &recipe.arch_vars {
			target.arch_vars.insert(parse_arch(name, key)?, vars.clone());
		}

		target = target.with_options(recipe.options.clone());

		if !recipe.unset.is_empty() {
			let unset = recipe.unset.clone();
			target = target.with_configure(move |state, _| {
				for key in &unset {
					state.options.remove(key);
				}
				Ok(())
			});
		}

		let mut arch_options = BTreeMap::new();
		for (key, table) in &recipe.arch_options {
			arch_options.insert(parse_arch(name, key)?, table.clone());
		}
		if !arch_options.is_empty() {
			let target_name = name.to_string();
			target = target.with_configure(move |state, expander| {
				match arch_options.get(&state.architecture()) {
					Some(table) => apply_options(&target_name, state, expander, table),
					None => Ok(())
				}
			});
		}

		if !recipe.cross_options.is_empty() {
			let table = recipe.cross_options.clone();
			let target_name = name.to_string();
			target = target.with_configure(move |state, expander| {
				if state.is_cross() && !state.xcode {
					apply_options(&target_name, state, expander, &table)?;
				}
				Ok(())
			});
		}

		if !recipe.xcode_options.is_empty() || !recipe.release_options.is_empty() {
			let xcode = recipe.xcode_options.clone();
			let release = recipe.release_options.clone();
			let target_name = name.to_string();
			target = target.with_configure(move |state, expander| {
				let table = if state.xcode { &xcode } else { &release };
				apply_options(&target_name, state, expander, table)
			});
		}

		if !recipe.append.is_empty() {
			let append = recipe.append.clone();
			target = target.with_configure(move |state, expander| {
				for (key, value) in &append {
					state.options.append(key.as_str(), &expander.expand(value));
				}
				Ok(())
			});
		}

		if !recipe.pkg_config_libs.is_empty() {
			let requests = recipe.pkg_config_libs.clone();
			target = target.with_configure(move |state, _| {
				for request in &requests {
					let libs = state.run_pkg_config(&["--libs"], &request.packages)?;
					state.options.append(request.option.as_str(), &libs);
				}
				Ok(())
			});
		}

		if !recipe.environment.is_empty() {
			let environment = recipe.environment.clone();
			target = target.with_configure(move |state, expander| {
				for (key, value) in &environment {
					state.environment.insert(key.clone(), expander.expand(value));
				}
				Ok(())
			});
		}

		Ok(target)
	}

	pub fn with_version(mut self, version: impl Into<String>) -> Self {
		self.version = Some(version.into());
		self
	}

	pub fn with_source(mut self, source: Source) -> Self {
		self.source = Some(source);
		self
	}

	pub fn with_src_root(mut self, src_root: impl Into<String>) -> Self {
		self.src_root = src_root.into();
		self
	}

	pub fn with_multi_platform(mut self, value: bool) -> Self {
		self.multi_platform = value;
		self
	}

	pub fn with_deployment_target(mut self, value: bool) -> Self {
		self.deployment_target = value;
		self
	}

	pub fn with_install(mut self, value: bool) -> Self {
		self.install = value;
		self
	}

	pub fn with_fix_pkg_config(mut self, value: bool) -> Self {
		self.fix_pkg_config = value;
		self
	}

	pub fn with_outputs(mut self, outputs: Vec<Output>) -> Self {
		self.outputs = outputs;
		self.copy_outputs = true;
		self
	}

	pub fn with_depends<I, S>(mut self, depends: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>
	{
		self.depends.extend(depends.into_iter().map(Into::into));
		self
	}

	pub fn with_detect(mut self, detect: Detect) -> Self {
		self.detect = detect;
		self
	}

	pub fn with_command(mut self, command: RecipeCommand) -> Self {
		self.commands.push(command);
		self
	}

	pub fn with_pkg_config_rules(mut self, rules: Vec<PatchRule>) -> Self {
		self.pkg_config_rules.extend(rules);
		self.fix_pkg_config = true;
		self
	}

	pub fn with_pkg_config_editor<F>(mut self, editor: F) -> Self
	where
		F: Fn(&Path, &str) -> Option<String> + 'static
	{
		self.pkg_config_hook = Some(Rc::new(editor));
		self.fix_pkg_config = true;
		self
	}

	/// Sets every entry of `table`, with placeholders expanded for the pass.
	pub fn with_options(self, table: toml::Table) -> Self {
		if table.is_empty() {
			return self;
		}

		let target_name = self.name.clone();
		self.with_configure(move |state, expander| apply_options(&target_name, state, expander, &table))
	}

	pub fn with_configure<F>(mut self, hook: F) -> Self
	where
		F: Fn(&mut BuildState, &Expander) -> Result<()> + 'static
	{
		self.configure_hooks.push(Box::new(hook));
		self
	}

	pub fn with_post_action(mut self, action: PostAction) -> Self {
		self.post_actions.push(action);
		self
	}

	pub fn with_post_build<F>(mut self, hook: F) -> Self
	where
		F: Fn(&BuildState, &Expander) -> Result<()> + 'static
	{
		self.post_build_hooks.push(Box::new(hook));
		self
	}

	pub fn with_check(mut self, check: CheckSpec) -> Self {
		self.check = Some(check);
		self
	}

	pub fn source_dir_name(&self) -> String {
		match &self.version {
			Some(version) => format!("{}-{}", self.name, version),
			None => self.name.clone()
		}
	}

	/// Placeholders of the pass the state currently points at, plus the target's own variables.
	pub fn expander(&self, state: &BuildState) -> Result<Expander> {
		let mut placeholders = state.placeholders();

		for (name, value) in &self.vars {
			placeholders.insert(name, value.clone());
		}
		if let Some(vars) = self.arch_vars.get(&state.architecture()) {
			for (name, value) in vars {
				placeholders.insert(name, value.clone());
			}
		}

		placeholders.compile()
	}

	pub fn prepare_source(&self, state: &BuildState) -> Result<()> {
		let dest = state.layout.source(&self.source_dir_name());

		if dest.exists() {
			if self.detect_in(&dest) {
				debug!("source of {} is already prepared", self.name);
				return Ok(());
			}

			info!("discarding unrecognized source of {}", self.name);
			remove_path(&dest)?;
		}

		let Some(source) = &self.source else {
			create_dir_all(&dest)?;
			return Ok(());
		};

		info!("preparing source of {}", self.name);
		Fetcher::new(state, &self.name)
			.prepare(source, &dest)
			.map_err(|source| Error::Fetch { target: self.name.clone(), source })
	}

	pub fn detect(&self, state: &BuildState) -> bool {
		self.detect_in(&state.source)
	}

	/// Whether `dir` holds this target's sources. Never touches the filesystem
	/// beyond metadata queries.
	pub fn detect_in(&self, dir: &Path) -> bool {
		if !dir.is_dir() {
			return false;
		}

		if self.detect.absent.iter().any(|marker| dir.join(marker).exists()) {
			return false;
		}

		if !self.detect.present.is_empty() {
			return self.detect.present.iter().all(|marker| dir.join(marker).exists());
		}

		let root = dir.join(&self.src_root);
		if !self.default_markers.is_empty() {
			return self.default_markers.iter().all(|marker| root.join(marker).exists());
		}

		// Nothing is fetched, an empty directory is the whole source.
		if self.source.is_none() {
			return true;
		}

		read_dir(&root)
			.map(|mut entries| entries.next().is_some())
			.unwrap_or(false)
	}

	pub fn configure(&self, state: &mut BuildState) -> Result<()> {
		let expander = self.expander(state)?;

		for hook in &self.configure_hooks {
			hook(state, &expander)?;
		}

		system::prepare(self, state)?;
		self.run_commands(Stage::Configure, state, &expander)?;
		system::configure(self, state)
	}

	pub fn build(&self, state: &BuildState) -> Result<()> {
		let expander = self.expander(state)?;

		self.run_commands(Stage::Build, state, &expander)?;
		system::build(self, state)
	}

	pub fn post_build(&self, state: &BuildState) -> Result<()> {
		let expander = self.expander(state)?;

		if self.install {
			system::install(self, state)?;
		}

		self.run_commands(Stage::PostBuild, state, &expander)?;

		if self.copy_outputs {
			postbuild::copy_outputs(self, state, &expander)?;
		}

		if self.fix_pkg_config {
			postbuild::fix_pkg_config(self, state, &expander)?;
		}

		for action in &self.post_actions {
			postbuild::run_action(state, &expander, action)?;
		}

		for hook in &self.post_build_hooks {
			hook(state, &expander)?;
		}

		Ok(())
	}

	fn run_commands(&self, stage: Stage, state: &BuildState, expander: &Expander) -> Result<()> {
		for command in self.commands.iter().filter(|command| command.stage == stage) {
			let mut args = command.args.iter().map(|arg| expander.expand(arg));
			let Some(program) = args.next() else {
				continue;
			};

			let cwd = match command.cwd {
				WorkDir::Source => state.source.clone(),
				WorkDir::Build => state.build_path.clone(),
				WorkDir::Work => state.work_path()
			};

			let mut cmd = ToolCommand::new(program).args(args);
			if state.verbose {
				cmd = cmd.args(command.verbose_args.iter().map(|arg| expander.expand(arg)));
			}

			let result = cmd.current_dir(cwd)
				.envs(&state.environment)
				.run(state.verbose);

			let target = self.name.clone();
			result.map_err(|failure| match stage {
				Stage::Configure => Error::Configure { target, failure },
				Stage::Build | Stage::PostBuild => Error::Build { target, failure }
			})?;
		}

		Ok(())
	}
}

fn apply_options(target: &str, state: &mut BuildState, expander: &Expander, table: &toml::Table) -> Result<()> {
	state.options
		.apply_table(table, |text| expander.expand(text))
		.map_err(|reason| Error::catalog(target, reason))
}
