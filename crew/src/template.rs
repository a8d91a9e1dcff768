//! Pipeline inputs and `{placeholder}` substitution
//!
//! Task descriptions and expected outputs are templates such as
//! `"Find a venue in {event_city} that meets criteria for {event_topic}."`.
//! Every referenced name must be present in the [`Inputs`] mapping; a
//! missing one is reported as [`UnresolvedPlaceholder`] and nothing is
//! substituted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder pattern")
});

/// A single input value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Integer(v) => write!(f, "{v}"),
            InputValue::Float(v) => write!(f, "{v}"),
            InputValue::Bool(v) => write!(f, "{v}"),
            InputValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for InputValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Mapping from placeholder name to value, substituted into every task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inputs(BTreeMap<String, InputValue>);

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input (builder style)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<InputValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<InputValue> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<InputValue>> FromIterator<(K, V)> for Inputs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A template referenced a name the inputs do not provide
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing placeholder '{{{0}}}'")]
pub struct UnresolvedPlaceholder(pub String);

/// Placeholder names referenced by a template, in order of first appearance
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        if let Some(name) = caps.get(1).map(|m| m.as_str()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Substitute every `{name}` in `template` from `inputs`
pub fn render(template: &str, inputs: &Inputs) -> Result<String, UnresolvedPlaceholder> {
    if let Some(missing) = placeholders(template)
        .into_iter()
        .find(|name| !inputs.contains(name))
    {
        return Err(UnresolvedPlaceholder(missing.to_string()));
    }

    let rendered = PLACEHOLDER_RE.replace_all(template, |caps: &Captures| {
        inputs
            .get(&caps[1])
            .map(ToString::to_string)
            .unwrap_or_else(|| caps[0].to_string())
    });

    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conference_inputs() -> Inputs {
        Inputs::new()
            .with("event_topic", "Tech Innovation Conference")
            .with("event_city", "San Francisco")
            .with("expected_participants", 500i64)
            .with("tentative_date", "2024-09-15")
    }

    #[test]
    fn test_render_substitutes_all() {
        let rendered = render(
            "Find a venue in {event_city} that meets criteria for {event_topic}.",
            &conference_inputs(),
        )
        .unwrap();

        assert_eq!(
            rendered,
            "Find a venue in San Francisco that meets criteria for Tech Innovation Conference."
        );
    }

    #[test]
    fn test_render_integer_values() {
        let rendered = render(
            "Coordinate catering for {expected_participants} participants on {tentative_date}.",
            &conference_inputs(),
        )
        .unwrap();
        assert_eq!(
            rendered,
            "Coordinate catering for 500 participants on 2024-09-15."
        );
    }

    #[test]
    fn test_render_missing_placeholder() {
        let err = render("Budget: {budget} in {event_city}", &conference_inputs()).unwrap_err();
        assert_eq!(err, UnresolvedPlaceholder("budget".to_string()));
    }

    #[test]
    fn test_repeated_placeholder() {
        let inputs = Inputs::new().with("x", "a");
        assert_eq!(render("{x}-{x}", &inputs).unwrap(), "a-a");
        assert_eq!(placeholders("{x}-{x}"), vec!["x"]);
    }

    #[test]
    fn test_non_identifier_braces_untouched() {
        let inputs = Inputs::new();
        assert_eq!(
            render(r#"Return JSON like {"name": "..."}"#, &inputs).unwrap(),
            r#"Return JSON like {"name": "..."}"#
        );
        assert!(placeholders("{ spaced }").is_empty());
    }

    #[test]
    fn test_inputs_from_toml() {
        let inputs: Inputs = toml::from_str(
            r#"
            event_topic = "Rust Meetup"
            expected_participants = 40
            budget = 1500.5
            "#,
        )
        .unwrap();

        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs.get("expected_participants"), Some(&InputValue::Integer(40)));
        assert_eq!(inputs.get("budget"), Some(&InputValue::Float(1500.5)));
        assert_eq!(inputs.get("event_topic").unwrap().to_string(), "Rust Meetup");
    }
}
