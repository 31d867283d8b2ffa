//! Device properties and the variable set rules operate on.

use crate::error::{Result, RulesError};
use crate::tokens::SourceType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Evaluation state: read-only device sources plus the variables that SET,
/// CLEAR and CHIPSET write.
///
/// # Examples
///
/// ```rust
/// use config_rules::engine::EvalContext;
/// use config_rules::tokens::SourceType;
///
/// let mut context = EvalContext::new()
///     .with_source(SourceType::DeviceMake, "samsung")
///     .with_variable("Profile", "low");
/// assert_eq!(context.source(SourceType::DeviceMake), "samsung");
/// assert_eq!(context.source(SourceType::DeviceModel), "");
/// context.set_variable("Profile", "high");
/// assert_eq!(context.variable("Profile"), Some("high"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalContext {
    sources: HashMap<SourceType, String>,
    variables: BTreeMap<String, String>,
    previous_match: Option<String>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: SourceType, value: impl Into<String>) -> Self {
        self.set_source(source, value);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_variable(name, value);
        self
    }

    pub fn set_source(&mut self, source: SourceType, value: impl Into<String>) {
        self.sources.insert(source, value.into());
    }

    /// Value of a device source; unset sources read as empty.
    pub fn source(&self, source: SourceType) -> &str {
        self.sources.get(&source).map(String::as_str).unwrap_or("")
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn append_variable(&mut self, name: &str, value: &str) {
        self.variables
            .entry(name.to_string())
            .or_default()
            .push_str(value);
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<String> {
        self.variables.remove(name)
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn into_variables(self) -> BTreeMap<String, String> {
        self.variables
    }

    /// Text captured by the last successful match test.
    pub fn previous_match(&self) -> Option<&str> {
        self.previous_match.as_deref()
    }

    pub(crate) fn set_previous_match(&mut self, value: impl Into<String>) {
        self.previous_match = Some(value.into());
    }

    /// Replace every `$(Name)` in `text` with the variable's value.
    ///
    /// Unknown variables expand to nothing; an unterminated `$(` is kept
    /// verbatim.
    ///
    /// ```rust
    /// use config_rules::engine::EvalContext;
    ///
    /// let context = EvalContext::new().with_variable("Gpu", "Mali");
    /// assert_eq!(context.expand("r.$(Gpu).$(None)"), "r.Mali.");
    /// assert_eq!(context.expand("open $(Gpu"), "open $(Gpu");
    /// ```
    pub fn expand(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("$(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find(')') {
                Some(end) => {
                    out.push_str(self.variable(&after[..end]).unwrap_or(""));
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Build a context from a YAML document.
    ///
    /// ```yaml
    /// sources:
    ///   SRC_DeviceMake: samsung
    ///   SRC_AndroidVersion: "13"
    /// variables:
    ///   Profile: low
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let document: ContextDocument = serde_yaml::from_str(yaml)
            .map_err(|e| RulesError::Config(format!("Failed to parse context YAML: {}", e)))?;
        document.into_context()
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

/// Serialized form of an [`EvalContext`], keyed by source keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextDocument {
    pub sources: BTreeMap<String, String>,
    pub variables: BTreeMap<String, String>,
}

impl ContextDocument {
    pub fn into_context(self) -> Result<EvalContext> {
        let mut context = EvalContext::new();
        for (keyword, value) in self.sources {
            let source = SourceType::from_keyword(&keyword);
            if !SourceType::DEVICE.contains(&source) {
                return Err(RulesError::Config(format!(
                    "'{}' is not a device source",
                    keyword
                )));
            }
            context.set_source(source, value);
        }
        context.variables = self.variables;
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_multiple_references() {
        let context = EvalContext::new()
            .with_variable("A", "1")
            .with_variable("B", "two");
        assert_eq!(context.expand("$(A)-$(B)-$(A)"), "1-two-1");
        assert_eq!(context.expand("no refs"), "no refs");
        assert_eq!(context.expand("$()"), "");
    }

    #[test]
    fn test_append_creates_missing_variable() {
        let mut context = EvalContext::new();
        context.append_variable("Cmd", "-a");
        context.append_variable("Cmd", " -b");
        assert_eq!(context.variable("Cmd"), Some("-a -b"));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
sources:
  SRC_DeviceMake: samsung
  SRC_VulkanAvailable: "true"
variables:
  Profile: low
"#;
        let context = EvalContext::from_yaml_str(yaml).unwrap();
        assert_eq!(context.source(SourceType::DeviceMake), "samsung");
        assert_eq!(context.source(SourceType::VulkanAvailable), "true");
        assert_eq!(context.variable("Profile"), Some("low"));
    }

    #[test]
    fn test_from_yaml_rejects_non_device_sources() {
        for keyword in ["Make", "[EXIST]", "SRC_PreviousRegexMatch"] {
            let yaml = format!("sources:\n  \"{keyword}\": x\n");
            assert!(
                matches!(EvalContext::from_yaml_str(&yaml), Err(RulesError::Config(_))),
                "{keyword}"
            );
        }
    }
}
