use aho_corasick::{AhoCorasick, MatchKind};
use crate::error::{Error, Result};

const MAX_PASSES: usize = 8;

/// Named `@NAME@` substitutions.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
	names: Vec<String>,
	values: Vec<String>
}

impl Placeholders {
	pub fn new() -> Self {
		Self::default()
	}

	/// Later insertions of the same name override earlier ones.
	pub fn insert(&mut self, name: &str, value: impl Into<String>) {
		let pattern = format!("@{}@", name.to_uppercase());
		let value = value.into();

		match self.names.iter().position(|existing| *existing == pattern) {
			Some(index) => self.values[index] = value,
			None => {
				self.names.push(pattern);
				self.values.push(value);
			}
		}
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		let pattern = format!("@{}@", name.to_uppercase());
		self.names.iter()
			.position(|existing| *existing == pattern)
			.map(|index| self.values[index].as_str())
	}

	pub fn compile(&self) -> Result<Expander> {
		let aho = AhoCorasick::builder()
			.match_kind(MatchKind::LeftmostLongest)
			.build(&self.names)
			.map_err(|e| Error::Placeholder(e.to_string()))?;

		Ok(Expander {
			aho,
			values: self.values.clone()
		})
	}
}

#[derive(Debug, Clone)]
pub struct Expander {
	aho: AhoCorasick,
	values: Vec<String>
}

impl Expander {
	/// Replaces placeholders until the text stops changing, so values may reference other placeholders.
	pub fn expand(&self, text: &str) -> String {
		let mut current = text.to_string();

		for _ in 0..MAX_PASSES {
			let next = self.aho.replace_all(&current, &self.values);
			if next == current {
				break;
			}
			current = next;
		}

		current
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expands_known_names() {
		let mut placeholders = Placeholders::new();
		placeholders.insert("prefix", "/tmp/install");
		placeholders.insert("ARCH", "arm64");

		let expander = placeholders.compile().unwrap();
		assert_eq!(expander.expand("@PREFIX@/lib/@ARCH@"), "/tmp/install/lib/arm64");
		assert_eq!(expander.expand("@UNKNOWN@"), "@UNKNOWN@");
	}

	#[test]
	fn expands_nested_values() {
		let mut placeholders = Placeholders::new();
		placeholders.insert("MAK", "cmpl_mac_@ARCH@.mak");
		placeholders.insert("ARCH", "arm64");

		let expander = placeholders.compile().unwrap();
		assert_eq!(expander.expand("../../@MAK@"), "../../cmpl_mac_arm64.mak");
	}

	#[test]
	fn later_insert_overrides() {
		let mut placeholders = Placeholders::new();
		placeholders.insert("MAK", "x64");
		placeholders.insert("mak", "arm64");

		assert_eq!(placeholders.get("MAK"), Some("arm64"));
		assert_eq!(placeholders.compile().unwrap().expand("@MAK@"), "arm64");
	}
}
