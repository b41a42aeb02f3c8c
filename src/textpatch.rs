use std::fs::{read_to_string, write};
use std::io;
use std::path::Path;
use crate::placeholder::Expander;
use crate::recipe::{LineEdit, PatchRule};

/// Per-line rewrite of a generated file. `None` deletes the line; the returned
/// text may span several lines.
pub type LineEditor = dyn Fn(&Path, &str) -> Option<String>;

/// Runs `editor` over every line of `path`. Returns whether the file changed.
pub fn update_text_file(path: &Path, editor: &LineEditor) -> io::Result<bool> {
	let content = read_to_string(path)?;
	let updated = apply(path, &content, editor);

	if updated == content {
		return Ok(false);
	}

	write(path, updated)?;
	Ok(true)
}

/// In-memory form of [`update_text_file`].
pub fn apply(path: &Path, content: &str, editor: &LineEditor) -> String {
	let body = content.strip_suffix('\n');
	let trailing_newline = body.is_some();
	let body = body.unwrap_or(content);

	if body.is_empty() && !trailing_newline {
		return String::new();
	}

	let mut lines = Vec::new();
	for line in body.split('\n') {
		if let Some(line) = editor(path, line) {
			lines.push(line);
		}
	}

	let mut result = lines.join("\n");
	if trailing_newline && !lines.is_empty() {
		result.push('\n');
	}
	result
}

/// Applies editors in order, each one seeing every line produced by the previous.
pub fn chain(editors: Vec<Box<LineEditor>>) -> Box<LineEditor> {
	Box::new(move |path: &Path, line: &str| {
		let mut lines = vec![line.to_string()];

		for editor in &editors {
			lines = lines.iter()
				.filter_map(|line| editor(path, line))
				.flat_map(|text| text.split('\n').map(str::to_string).collect::<Vec<_>>())
				.collect();
		}

		if lines.is_empty() {
			None
		} else {
			Some(lines.join("\n"))
		}
	})
}

/// Makes a `.pc` file relocatable.
pub fn pkg_config_editor(install_path: &Path) -> Box<LineEditor> {
	let install = install_path.to_string_lossy().into_owned();

	Box::new(move |_: &Path, line: &str| {
		if line.starts_with("prefix=") {
			Some("prefix=${pcfiledir}/../..".to_string())
		} else if !install.is_empty() {
			Some(line.replace(&install, "${prefix}"))
		} else {
			Some(line.to_string())
		}
	})
}

/// Makes a `*-config` shell script relocatable.
pub fn config_script_editor(install_path: &Path) -> Box<LineEditor> {
	let install = install_path.to_string_lossy().into_owned();

	Box::new(move |_: &Path, line: &str| {
		if line.starts_with("prefix=") {
			Some(r#"prefix="$(cd "${0%/*}/.."; pwd)""#.to_string())
		} else if !install.is_empty() {
			Some(line.replace(&install, "${prefix}"))
		} else {
			Some(line.to_string())
		}
	})
}

const EXPECTED_TARGETS: &[&str] = &[
	"foreach(_cmake_expected_target IN ITEMS ",
	"foreach(_expectedTarget "
];

const IMPORT_CHECKS: &[&str] = &[
	"list(APPEND _cmake_import_check_targets ",
	"list(APPEND _IMPORT_CHECK_TARGETS "
];

/// Restricts a CMake exported targets file to a single target.
pub fn keep_cmake_target_editor(target: &str) -> Box<LineEditor> {
	let target = target.to_string();

	Box::new(move |_: &Path, line: &str| {
		if IMPORT_CHECKS.iter().any(|prefix| line.starts_with(prefix)) {
			return None;
		}

		match EXPECTED_TARGETS.iter().find(|prefix| line.starts_with(**prefix)) {
			Some(prefix) => Some(format!("{}{})", prefix, target)),
			None => Some(line.to_string())
		}
	})
}

/// Turns declarative rules into an editor. The first rule whose prefix matches
/// a line wins. Lines equal to inserted text are dropped before matching, so
/// running the editor over its own output changes nothing.
pub fn compile_rules(rules: &[PatchRule], expander: &Expander) -> Box<LineEditor> {
	let rules: Vec<PatchRule> = rules.iter()
		.map(|rule| PatchRule {
			prefix: expander.expand(&rule.prefix),
			edit: match &rule.edit {
				LineEdit::Replace { replace } => LineEdit::Replace { replace: expander.expand(replace) },
				LineEdit::Delete { delete } => LineEdit::Delete { delete: *delete },
				LineEdit::Append { append } => LineEdit::Append { append: expander.expand(append) },
				LineEdit::Prepend { prepend } => LineEdit::Prepend { prepend: expander.expand(prepend) },
				LineEdit::Substitute { substitute, with } => LineEdit::Substitute {
					substitute: expander.expand(substitute),
					with: expander.expand(with)
				}
			}
		})
		.collect();

	let inserted: Vec<String> = rules.iter()
		.filter_map(|rule| match &rule.edit {
			LineEdit::Append { append: text } | LineEdit::Prepend { prepend: text } => Some(text),
			_ => None
		})
		.flat_map(|text| text.split('\n').map(str::to_string).collect::<Vec<_>>())
		.collect();

	Box::new(move |_: &Path, line: &str| {
		if inserted.iter().any(|text| text == line) {
			return None;
		}

		let Some(rule) = rules.iter().find(|rule| line.starts_with(&rule.prefix)) else {
			return Some(line.to_string());
		};

		match &rule.edit {
			LineEdit::Replace { replace } => Some(replace.clone()),
			LineEdit::Delete { delete: true } => None,
			LineEdit::Delete { delete: false } => Some(line.to_string()),
			LineEdit::Append { append } => Some(format!("{}\n{}", line, append)),
			LineEdit::Prepend { prepend } => Some(format!("{}\n{}", prepend, line)),
			LineEdit::Substitute { substitute, with } => Some(line.replace(substitute.as_str(), with))
		}
	})
}
