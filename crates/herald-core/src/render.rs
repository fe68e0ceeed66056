//! Template merge engine.
//!
//! Substitutes `{{name}}` tokens into subject and body text. Pure and
//! idempotent: unmatched tokens stay verbatim, so merging an already-merged
//! document is a no-op.

use std::collections::HashMap;

use crate::models::{Event, Participant, Template};

/// A fully merged message ready to hand to a send provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Merged subject line.
    pub subject: String,
    /// Merged HTML body.
    pub html: String,
    /// Merged plain-text body; falls back to empty when the template has
    /// none.
    pub text: String,
}

/// Merges a template with per-recipient variables.
pub fn merge(template: &Template, vars: &HashMap<String, String>) -> RenderedMessage {
    RenderedMessage {
        subject: merge_str(&template.subject, vars),
        html: merge_str(&template.html_body, vars),
        text: merge_str(template.text_body.as_deref().unwrap_or_default(), vars),
    }
}

/// Substitutes `{{name}}` tokens in a single string.
///
/// Tokens without a matching variable are left in place. A stray `{{` with
/// no closing braces is copied through untouched.
pub fn merge_str(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let name = after_open[..close].trim();
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[open..open + 2 + close + 2]),
                }
                rest = &after_open[close + 2..];
            },
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            },
        }
    }

    out.push_str(rest);
    out
}

/// Sentinel table name for recipients without a confirmed seat.
pub const UNASSIGNED_TABLE: &str = "Unassigned";

/// Builds the standard per-recipient variable map.
///
/// Always defines `name`, `company`, `table`, and `link`; templates may use
/// any subset.
pub fn recipient_vars(
    event: &Event,
    participant: &Participant,
    table_name: Option<String>,
    link_base: &str,
) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("name".to_string(), participant.name.clone());
    vars.insert(
        "company".to_string(),
        participant.company.clone().unwrap_or_default(),
    );
    vars.insert(
        "table".to_string(),
        table_name.unwrap_or_else(|| UNASSIGNED_TABLE.to_string()),
    );
    vars.insert(
        "link".to_string(),
        format!(
            "{}/e/{}/r/{}",
            link_base.trim_end_matches('/'),
            event.code,
            participant.id
        ),
    );
    vars
}
