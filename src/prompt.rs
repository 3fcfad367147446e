//! Named-placeholder prompt templates.
//!
//! Templates use `{{name}}` slots. Rendering is a single pass over the
//! template source: substituted values are copied verbatim and never
//! scanned again, so braces inside artifacts or inputs need no escaping.
//!
//! Slots available to stage prompts:
//!
//! | Slot                 | Value                                          |
//! |----------------------|------------------------------------------------|
//! | `{{inputs}}`         | every input as `key: value`, one per line       |
//! | `{{input.<key>}}`    | a single input                                  |
//! | `{{artifact.<name>}}`| the artifact of stage `<name>`                  |
//! | `{{stage}}`          | the stage being generated                       |
//! | `{{feedback}}`       | latest reviewer feedback for this stage         |
//! | `{{previous}}`       | the previous draft of this stage                |
//! | `{{item}}`           | the work item of a fan-out worker               |

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder regex")
});

/// Variables available during rendering.
pub type PromptVars = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
}

/// Rendered text plus the names of slots that had no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub missing: Vec<String>,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Slot names in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&self.source) {
            let name = caps[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Render the template. Slots without a value render as empty text and
    /// are reported in [`Rendered::missing`].
    pub fn render(&self, vars: &PromptVars) -> Rendered {
        let mut missing = Vec::new();
        let text = PLACEHOLDER
            .replace_all(&self.source, |caps: &Captures<'_>| {
                let name = &caps[1];
                match vars.get(name) {
                    Some(value) => value.clone(),
                    None => {
                        if !missing.iter().any(|m: &String| m == name) {
                            missing.push(name.to_string());
                        }
                        String::new()
                    }
                }
            })
            .into_owned();
        Rendered { text, missing }
    }
}
