use std::collections::BTreeMap;
use serde::Deserialize;

fn yes() -> bool {
	true
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Source {
	Archive {
		url: String,
		sha256: String,
		#[serde(default)]
		patches: Vec<String>
	},
	Git {
		git: String,
		#[serde(default)]
		branch: Option<String>,
		#[serde(default)]
		patches: Vec<String>
	}
}

impl Source {
	pub fn patches(&self) -> &[String] {
		match self {
			Self::Archive { patches, .. } | Self::Git { patches, .. } => patches
		}
	}
}

/// Filesystem markers telling one source tree apart from another.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Detect {
	#[serde(default)]
	pub present: Vec<String>,
	#[serde(default)]
	pub absent: Vec<String>
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Output {
	Path(String),
	Renamed {
		path: String,
		name: String
	}
}

impl Output {
	pub fn path(&self) -> &str {
		match self {
			Self::Path(path) | Self::Renamed { path, .. } => path
		}
	}

	/// Name of the copy placed in `bin/`.
	pub fn file_name(&self) -> &str {
		match self {
			Self::Path(path) => path.rsplit('/').next().unwrap_or(path),
			Self::Renamed { name, .. } => name
		}
	}
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
	Configure,
	Build,
	PostBuild
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WorkDir {
	Source,
	#[default]
	Build,
	/// `src_root` inside the build directory.
	Work
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RecipeCommand {
	pub stage: Stage,
	#[serde(default)]
	pub cwd: WorkDir,
	pub args: Vec<String>,
	/// Appended to `args` in verbose mode.
	#[serde(default)]
	pub verbose_args: Vec<String>
}

/// Appends `pkg-config --libs <packages>` to an option.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PkgConfigLibs {
	pub option: String,
	pub packages: Vec<String>
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum LineEdit {
	Replace {
		replace: String
	},
	Delete {
		delete: bool
	},
	Append {
		append: String
	},
	Prepend {
		prepend: String
	},
	Substitute {
		substitute: String,
		with: String
	}
}

/// Edit applied to lines starting with `prefix`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PatchRule {
	pub prefix: String,
	#[serde(flatten)]
	pub edit: LineEdit
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PcSpec {
	pub filename: Option<String>,
	pub name: Option<String>,
	pub description: String,
	pub version: Option<String>,
	#[serde(default)]
	pub requires: String,
	pub libs: Option<String>,
	#[serde(default)]
	pub libs_private: String,
	pub cflags: Option<String>
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PostAction {
	Patch {
		file: String,
		rules: Vec<PatchRule>
	},
	ConfigScript {
		file: String,
		#[serde(default)]
		rules: Vec<PatchRule>
	},
	WritePc(PcSpec),
	KeepCmakeTarget {
		target: String
	},
	Copy {
		from: String,
		to: String
	},
	CopyTree {
		from: String,
		to: String
	},
	Move {
		from: String,
		to: String
	},
	Remove {
		path: String
	},
	Mkdir {
		path: String
	}
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CheckSpec {
	pub source: String,
	pub packages: Vec<String>
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
	pub name: String,
	#[serde(default)]
	pub version: Option<String>,
	pub template: String,
	#[serde(default)]
	pub source: Option<Source>,
	#[serde(default)]
	pub src_root: String,
	#[serde(default)]
	pub multi_platform: Option<bool>,
	/// When false the pass is configured without a deployment minimum.
	#[serde(default = "yes")]
	pub deployment_target: bool,
	#[serde(default)]
	pub install: Option<bool>,
	#[serde(default)]
	pub configure_prefix: Option<bool>,
	/// Replacement for `make`, e.g. `gmake`.
	#[serde(default)]
	pub tool: Option<String>,
	#[serde(default)]
	pub outputs: Vec<Output>,
	#[serde(default)]
	pub depends: Vec<String>,
	#[serde(default)]
	pub detect: Option<Detect>,

	#[serde(default)]
	pub options: toml::Table,
	#[serde(default)]
	pub unset: Vec<String>,
	#[serde(default)]
	pub append: BTreeMap<String, String>,
	#[serde(default)]
	pub pkg_config_libs: Vec<PkgConfigLibs>,
	#[serde(default)]
	pub arch_options: BTreeMap<String, toml::Table>,
	#[serde(default)]
	pub cross_options: toml::Table,
	#[serde(default)]
	pub xcode_options: toml::Table,
	#[serde(default)]
	pub release_options: toml::Table,
	#[serde(default)]
	pub environment: BTreeMap<String, String>,

	#[serde(default)]
	pub vars: BTreeMap<String, String>,
	#[serde(default)]
	pub arch_vars: BTreeMap<String, BTreeMap<String, String>>,

	#[serde(default)]
	pub commands: Vec<RecipeCommand>,
	#[serde(default)]
	pub pkg_config: Vec<PatchRule>,
	#[serde(default)]
	pub post_build: Vec<PostAction>,
	#[serde(default)]
	pub check: Option<CheckSpec>
}

impl Recipe {
	/// Directory name of the prepared source, unique per name and version.
	pub fn source_dir_name(&self) -> String {
		match &self.version {
			Some(version) => format!("{}-{}", self.name, version),
			None => self.name.clone()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_full_recipe() {
		let recipe: Recipe = toml::from_str(r#"
			name = "opus"
			version = "1.5.2"
			template = "cmake-static"
			source = { url = "https://example.org/opus-1.5.2.tar.gz", sha256 = "00" }
			options = { PC_BUILD = "floating-point" }
			outputs = ["opus_demo", { path = "b/m_@MAK@/7zz", name = "7zz" }]

			[[pkg_config]]
			prefix = "Cflags:"
			replace = "Cflags: -I${includedir}/opus"

			[[pkg_config]]
			prefix = "bindir="
			delete = true

			[[pkg_config]]
			prefix = "libdir="
			prepend = "exec_prefix=${prefix}"

			[[post_build]]
			action = "move"
			from = "include/opus/sub"
			to = "include/"

			[[post_build]]
			action = "write-pc"
			description = "Opus codec"
			libs_private = "-lm"

			[[commands]]
			stage = "configure"
			cwd = "source"
			args = ["python3", "update.py"]
		"#).unwrap();

		assert_eq!(recipe.source_dir_name(), "opus-1.5.2");
		assert!(recipe.deployment_target);
		assert!(matches!(recipe.source, Some(Source::Archive { .. })));
		assert_eq!(recipe.outputs[1].file_name(), "7zz");
		assert_eq!(recipe.outputs[0].file_name(), "opus_demo");
		assert_eq!(recipe.pkg_config[0].edit, LineEdit::Replace {
			replace: "Cflags: -I${includedir}/opus".to_string()
		});
		assert_eq!(recipe.pkg_config[1].edit, LineEdit::Delete { delete: true });
		assert!(matches!(recipe.pkg_config[2].edit, LineEdit::Prepend { .. }));
		assert!(matches!(&recipe.post_build[1], PostAction::WritePc(spec) if spec.libs_private == "-lm"));
		assert_eq!(recipe.commands[0].cwd, WorkDir::Source);
		assert_eq!(recipe.commands[0].stage, Stage::Configure);
	}

	#[test]
	fn parses_git_source() {
		let recipe: Recipe = toml::from_str(r#"
			name = "woof"
			template = "cmake-main"
			source = { git = "https://github.com/fabiangreffrath/woof.git" }
		"#).unwrap();

		assert_eq!(recipe.source_dir_name(), "woof");
		assert!(matches!(recipe.source, Some(Source::Git { branch: None, .. })));
	}

	#[test]
	fn rejects_unknown_field() {
		let result: Result<Recipe, _> = toml::from_str(r#"
			name = "bad"
			template = "cmake"
			optoins = {}
		"#);

		assert!(result.is_err());
	}
}
