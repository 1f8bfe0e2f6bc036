//! Prompt Templates
//!
//! Minimal `{variable}` substitution. Only declared variables are replaced, so
//! other braces in the template (JSON examples, tool descriptions) pass through
//! untouched. Partial variables are bound when the template is built and
//! rendered in the same pass as call-time values.

use serde_json::Value;

use crate::chain::Values;
use crate::error::{ChainError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    input_variables: Vec<String>,
    partial_variables: Values,
}

impl PromptTemplate {
    /// Template with an explicit variable list
    pub fn new(template: impl Into<String>, input_variables: Vec<String>) -> Self {
        Self {
            template: template.into(),
            input_variables,
            partial_variables: Values::new(),
        }
    }

    /// Template whose variables are every `{identifier}` placeholder, in order
    /// of first appearance
    pub fn from_template(template: impl Into<String>) -> Self {
        let template = template.into();
        let mut input_variables: Vec<String> = Vec::new();

        let mut rest = template.as_str();
        while let Some(open) = rest.find('{') {
            rest = &rest[open + 1..];
            let Some(close) = rest.find('}') else { break };
            let name = &rest[..close];
            if is_identifier(name) && !input_variables.iter().any(|v| v == name) {
                input_variables.push(name.to_string());
            }
        }

        Self {
            template,
            input_variables,
            partial_variables: Values::new(),
        }
    }

    /// Bind a placeholder to a fixed value. The name stops being an input
    /// variable and its value is inserted verbatim.
    #[must_use]
    pub fn with_partial(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self.input_variables.retain(|v| *v != name);
        self.partial_variables.insert(name, value.into());
        self
    }

    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the template in one pass, so substituted text is never itself
    /// rescanned. Every declared variable must be present.
    pub fn format(&self, values: &Values) -> Result<String> {
        if let Some(name) = self.input_variables.iter().find(|v| !values.contains_key(*v)) {
            return Err(ChainError::Template(format!("missing variable `{name}`")));
        }

        let mut rendered = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let declared = after.find('}').map(|close| &after[..close]).and_then(|name| {
                let value = if self.input_variables.iter().any(|v| v == name) {
                    values.get(name)
                } else {
                    self.partial_variables.get(name)
                };
                value.map(|value| (name, value))
            });

            match declared {
                Some((name, value)) => {
                    match value {
                        Value::String(s) => rendered.push_str(s),
                        other => rendered.push_str(&other.to_string()),
                    }
                    rest = &after[name.len() + 1..];
                }
                None => {
                    rendered.push('{');
                    rest = after;
                }
            }
        }
        rendered.push_str(rest);
        Ok(rendered)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
