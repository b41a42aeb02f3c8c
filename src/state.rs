use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use crate::arch::Arch;
use crate::command::{lookup, Environment, Tools};
use crate::config::Config;
use crate::error::Result;
use crate::options::Options;
use crate::pkgconfig;
use crate::placeholder::Placeholders;
use crate::target::Target;

/// Host variables carried into the otherwise empty build environment.
const HOST_VARIABLES: &[&str] = &[
	"PATH", "HOME", "USER", "TMPDIR", "TERM", "LANG", "SDKROOT", "DEVELOPER_DIR"
];

pub const META_DIR_NAME: &str = ".depsmith";

/// Directory scheme under the build root.
#[derive(Debug, Clone)]
pub struct Layout {
	root: PathBuf
}

impl Layout {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn downloads(&self) -> PathBuf {
		self.root.join("download")
	}

	pub fn sources(&self) -> PathBuf {
		self.root.join("source")
	}

	pub fn source(&self, dir_name: &str) -> PathBuf {
		self.sources().join(dir_name)
	}

	pub fn build(&self, name: &str, arch: Arch) -> PathBuf {
		self.root.join("build").join(name).join(arch.as_str())
	}

	pub fn install(&self, name: &str, arch: Arch) -> PathBuf {
		self.root.join("install").join(name).join(arch.as_str())
	}

	/// Per-target tree with all architectures merged.
	pub fn deps(&self, name: &str) -> PathBuf {
		self.root.join("deps").join(name)
	}

	/// Shared prefix every later target builds against.
	pub fn prefix(&self) -> PathBuf {
		self.root.join("prefix")
	}

	pub fn meta(&self, name: &str) -> PathBuf {
		self.prefix().join(META_DIR_NAME).join(name)
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildFlags {
	pub xcode: bool,
	pub verbose: bool
}

/// Context of a single pass: one target, one architecture.
#[derive(Debug, Clone)]
pub struct BuildState {
	pub config: Config,
	pub tools: Tools,
	pub layout: Layout,
	pub xcode: bool,
	pub verbose: bool,

	pub target: String,
	pub version: Option<String>,
	pub source: PathBuf,
	pub src_root: String,
	pub build_path: PathBuf,
	pub install_path: PathBuf,
	pub native_build_path: PathBuf,

	pub options: Options,
	pub environment: Environment,
	/// `None` leaves the deployment minimum to the build system.
	pub deployment_target: Option<String>,

	arch: Arch
}

impl BuildState {
	pub fn new(config: Config, tools: Tools, flags: BuildFlags) -> Self {
		let layout = Layout::new(&config.general.build_root);
		let deployment_target = Some(config.general.deployment_target.clone());
		let arch = Arch::host();

		let mut state = Self {
			config,
			tools,
			layout,
			xcode: flags.xcode,
			verbose: flags.verbose,
			target: String::new(),
			version: None,
			source: PathBuf::new(),
			src_root: String::new(),
			build_path: PathBuf::new(),
			install_path: PathBuf::new(),
			native_build_path: PathBuf::new(),
			options: Options::new(),
			environment: Environment::new(),
			deployment_target,
			arch
		};
		state.environment = state.baseline_environment();
		state
	}

	/// Points the state at `target` built for `arch`. Options and environment
	/// are reset to the baseline.
	pub fn repoint(&mut self, target: &Target, arch: Arch) {
		self.arch = arch;
		self.target = target.name.clone();
		self.version = target.version.clone();
		self.source = self.layout.source(&target.source_dir_name());
		self.src_root = target.src_root.clone();
		self.build_path = self.layout.build(&target.name, arch);
		self.install_path = self.layout.install(&target.name, arch);
		self.native_build_path = self.layout.build(&target.name, Arch::host());
		self.deployment_target = target.deployment_target
			.then(|| self.config.general.deployment_target.clone());

		self.options = Options::new();
		self.environment = self.baseline_environment();
	}

	/// Creates the build and install directories of the pass.
	pub fn ensure_paths(&self) -> Result<()> {
		for path in [&self.build_path, &self.install_path, &self.prefix_path()] {
			create_dir_all(path)?;
		}
		Ok(())
	}

	pub fn architecture(&self) -> Arch {
		self.arch
	}

	pub fn is_cross(&self) -> bool {
		self.arch != Arch::host()
	}

	pub fn has_source_file(&self, path: impl AsRef<Path>) -> bool {
		self.source.join(path).exists()
	}

	pub fn source_root(&self) -> PathBuf {
		self.source.join(&self.src_root)
	}

	/// `src_root` inside the build directory, for systems building in a mirrored tree.
	pub fn work_path(&self) -> PathBuf {
		self.build_path.join(&self.src_root)
	}

	pub fn prefix_path(&self) -> PathBuf {
		self.layout.prefix()
	}

	pub fn include_path(&self) -> PathBuf {
		self.prefix_path().join("include")
	}

	pub fn lib_path(&self) -> PathBuf {
		self.prefix_path().join("lib")
	}

	pub fn jobs(&self) -> usize {
		self.config.threads()
	}

	pub fn run_pkg_config(&self, args: &[&str], packages: &[String]) -> Result<String> {
		pkgconfig::query(self, args, packages)
	}

	fn baseline_environment(&self) -> Environment {
		let mut env = Environment::new();

		for name in HOST_VARIABLES {
			if let Ok(value) = std::env::var(name) {
				env.insert(name.to_string(), value);
			}
		}

		let prefix = self.prefix_path();
		let build = &self.config.build;

		env.insert("LC_ALL".to_string(), "C".to_string());
		env.insert("CC".to_string(), lookup(&build.cc).to_string_lossy().into_owned());
		env.insert("CXX".to_string(), lookup(&build.cxx).to_string_lossy().into_owned());

		let mut common = vec!["-arch".to_string(), self.arch.to_string()];
		if let Some(version) = &self.deployment_target {
			common.push(format!("-mmacosx-version-min={}", version));
			env.insert("MACOSX_DEPLOYMENT_TARGET".to_string(), version.clone());
		}

		let compile = join_flags(&common, &[
			&format!("-I{}", prefix.join("include").display()),
			&build.cflags
		]);
		let compile_cxx = join_flags(&common, &[
			&format!("-I{}", prefix.join("include").display()),
			&build.cxxflags
		]);
		let link = join_flags(&common, &[
			&format!("-L{}", prefix.join("lib").display()),
			&build.ldflags
		]);

		env.insert("CFLAGS".to_string(), compile.clone());
		env.insert("OBJCFLAGS".to_string(), compile);
		env.insert("CXXFLAGS".to_string(), compile_cxx);
		env.insert("LDFLAGS".to_string(), link);

		let pkg_config_path = format!(
			"{}:{}",
			prefix.join("lib/pkgconfig").display(),
			prefix.join("share/pkgconfig").display());
		env.insert("PKG_CONFIG_PATH".to_string(), pkg_config_path.clone());
		env.insert("PKG_CONFIG_LIBDIR".to_string(), pkg_config_path);

		let bin = prefix.join("bin").to_string_lossy().into_owned();
		let path = match env.get("PATH") {
			Some(existing) if !existing.is_empty() => format!("{}:{}", bin, existing),
			_ => bin
		};
		env.insert("PATH".to_string(), path);

		for (name, value) in &build.others {
			env.insert(name.clone(), value.clone());
		}

		env
	}

	/// Standard `@NAME@` set of the current pass.
	pub fn placeholders(&self) -> Placeholders {
		let mut placeholders = Placeholders::new();

		for (name, value) in &self.config.general.others {
			placeholders.insert(name, value.clone());
		}

		let path = |path: &Path| path.to_string_lossy().into_owned();

		placeholders.insert("NAME", self.target.clone());
		placeholders.insert("VERSION", self.version.clone().unwrap_or_default());
		placeholders.insert("ARCH", self.arch.as_str());
		placeholders.insert("HOST_ARCH", Arch::host().as_str());
		placeholders.insert("PREFIX", path(&self.install_path));
		placeholders.insert("DEPS", path(&self.prefix_path()));
		placeholders.insert("SOURCE", path(&self.source));
		placeholders.insert("SRC_ROOT", path(&self.source_root()));
		placeholders.insert("BUILD", path(&self.build_path));
		placeholders.insert("WORK", path(&self.work_path()));
		placeholders.insert("NATIVE_BUILD", path(&self.native_build_path));
		placeholders.insert("PATCHES", path(&self.config.general.patches_dir));
		placeholders.insert("DEPLOYMENT_TARGET", self.deployment_target.clone().unwrap_or_default());
		placeholders.insert("JOBS", self.jobs().to_string());

		for name in ["CFLAGS", "CXXFLAGS", "LDFLAGS"] {
			placeholders.insert(name, self.environment.get(name).cloned().unwrap_or_default());
		}

		placeholders
	}
}

fn join_flags(common: &[String], rest: &[&str]) -> String {
	common.iter()
		.map(String::as_str)
		.chain(rest.iter().copied())
		.filter(|flag| !flag.is_empty())
		.collect::<Vec<_>>()
		.join(" ")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::template::Template;

	fn state(root: &Path) -> BuildState {
		let mut config = Config::default();
		config.general.build_root = root.to_path_buf();
		config.general.threads = 2;
		BuildState::new(config, Tools::default(), BuildFlags::default())
	}

	#[test]
	fn repoint_resets_options_and_environment() {
		let dir = tempfile::tempdir().unwrap();
		let mut state = state(dir.path());
		let target = Target::new("zlib-ng", Template::custom()).with_version("2.2.4");

		state.repoint(&target, Arch::X86_64);
		state.options.set("ZLIB_COMPAT", "YES");
		state.environment.insert("LDFLAGS".to_string(), "-framework Foundation".to_string());

		state.repoint(&target, Arch::Arm64);

		assert!(state.options.is_empty());
		assert!(state.environment["LDFLAGS"].starts_with("-arch arm64"));
		assert_eq!(state.build_path, dir.path().join("build/zlib-ng/arm64"));
		assert_eq!(state.install_path, dir.path().join("install/zlib-ng/arm64"));
		assert_eq!(state.source, dir.path().join("source/zlib-ng-2.2.4"));
	}

	#[test]
	fn baseline_targets_shared_prefix() {
		let dir = tempfile::tempdir().unwrap();
		let state = state(dir.path());
		let prefix = dir.path().join("prefix");

		let env = &state.environment;
		assert_eq!(env["LC_ALL"], "C");
		assert_eq!(env["MACOSX_DEPLOYMENT_TARGET"], "10.15");
		assert!(env["CFLAGS"].contains("-mmacosx-version-min=10.15"));
		assert!(env["CFLAGS"].contains(&format!("-I{}", prefix.join("include").display())));
		assert!(env["LDFLAGS"].contains(&format!("-L{}", prefix.join("lib").display())));
		assert!(env["PKG_CONFIG_LIBDIR"].starts_with(&prefix.join("lib/pkgconfig").display().to_string()));
		assert!(env["PATH"].starts_with(&prefix.join("bin").display().to_string()));
	}

	#[test]
	fn deployment_target_can_be_dropped() {
		let dir = tempfile::tempdir().unwrap();
		let mut state = state(dir.path());
		let target = Target::new("moltenvk", Template::custom()).with_deployment_target(false);

		state.repoint(&target, Arch::host());

		assert!(!state.environment.contains_key("MACOSX_DEPLOYMENT_TARGET"));
		assert!(!state.environment["CFLAGS"].contains("-mmacosx-version-min"));
	}

	#[test]
	fn placeholders_describe_pass() {
		let dir = tempfile::tempdir().unwrap();
		let mut state = state(dir.path());
		let target = Target::new("glew", Template::custom()).with_src_root("build/cmake");
		state.repoint(&target, Arch::Arm64);

		let expander = state.placeholders().compile().unwrap();
		assert_eq!(
			expander.expand("@SRC_ROOT@"),
			dir.path().join("source/glew/build/cmake").display().to_string());
		assert_eq!(expander.expand("@ARCH@ @JOBS@"), "arm64 2");
	}
}
