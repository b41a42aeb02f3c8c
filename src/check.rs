use std::fs::write;
use std::path::Path;
use tracing::info;
use crate::command::ToolCommand;
use crate::error::{Error, Result};
use crate::recipe::CheckSpec;
use crate::state::BuildState;

const PRELUDE_NAME: &str = "depsmith_check.h";

/// Force-included into every smoke test.
pub const PRELUDE: &str = "\
#include <stdio.h>
#include <stdlib.h>

#define DEPSMITH_EXPECT(condition) \\
	do { \\
		if (!(condition)) { \\
			fprintf(stderr, \"%s:%d: expectation failed: %s\\n\", __FILE__, __LINE__, #condition); \\
			exit(1); \\
		} \\
	} while (0)
";

fn is_c_source(path: &Path) -> bool {
	path.extension().is_some_and(|ext| ext == "c")
}

fn split_flags(value: Option<&String>) -> Vec<String> {
	value
		.map(|value| value.split_whitespace().map(str::to_string).collect())
		.unwrap_or_default()
}

/// Compiles the smoke test against the shared prefix and runs it.
pub fn run(state: &BuildState, name: &str, spec: &CheckSpec) -> Result<()> {
	let source = state.config.general.checks_dir.join(&spec.source);
	if !source.is_file() {
		return Err(Error::post_process(name, source, "smoke test source does not exist"));
	}

	info!("checking {}", name);

	let scratch = tempfile::Builder::new()
		.prefix(".check-")
		.tempdir_in(state.layout.root())?;
	let prelude = scratch.path().join(PRELUDE_NAME);
	write(&prelude, PRELUDE)?;

	let flags = state.run_pkg_config(&["--cflags", "--libs"], &spec.packages)?;
	let env = &state.environment;

	let (compiler, compile_flags) = if is_c_source(&source) {
		("CC", "CFLAGS")
	} else {
		("CXX", "CXXFLAGS")
	};
	let compiler = env.get(compiler).cloned().unwrap_or_else(|| match compiler {
		"CC" => state.config.build.cc.clone(),
		_ => state.config.build.cxx.clone()
	});

	let exe = scratch.path().join(name);
	let mut cmd = ToolCommand::new(compiler);
	if !is_c_source(&source) {
		cmd = cmd.arg("-std=c++17");
	}

	let check_error = |failure| Error::Check { target: name.to_string(), failure };

	cmd.args(split_flags(env.get(compile_flags)))
		.arg("-include")
		.arg(prelude.to_string_lossy())
		.arg(source.to_string_lossy())
		.args(flags.split_whitespace().map(str::to_string))
		.args(split_flags(env.get("LDFLAGS")))
		.arg("-o")
		.arg(exe.to_string_lossy())
		.current_dir(scratch.path())
		.envs(env)
		.run(state.verbose)
		.map_err(check_error)?;

	ToolCommand::new(&exe)
		.current_dir(scratch.path())
		.envs(env)
		.run(state.verbose)
		.map_err(check_error)
}
