//! Hackathon context: document flattening and the skill-suggestion seam.
//!
//! Hackathon metadata lives outside this crate. A [`MetadataStore`] hands back
//! the raw document, [`flatten_document`] turns it into `key: value` lines, and
//! a [`SkillSuggester`] reads those lines and proposes the skills a winning
//! team needs. The skills are then embedded like a participant profile.


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Skill profile proposed for a hackathon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DreamTeam {
    pub hackathon_name: String,
    pub required_skills: Vec<String>,
}

/// Source of hackathon documents
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch the full document for `hackathon_id`, or `NotFound`
    async fn fetch_hackathon_document(&self, hackathon_id: &str) -> Result<Value>;
}

/// Proposes the skills a team should cover for a hackathon
#[async_trait]
pub trait SkillSuggester: Send + Sync {
    async fn suggest_skills(&self, context: &str) -> Result<DreamTeam>;
}

/// Render a JSON document as one `dotted.key[i]: value` line per leaf
///
/// Object keys are joined with `.`, array elements get an `[i]` suffix.
/// Strings are written without quotes; empty objects and arrays produce
/// no lines. An array nested directly in an array stays on one line as
/// compact JSON, `key[i]: [..]`.
#[inline]
pub fn flatten_document(document: &Value) -> String {
    let mut lines = Vec::new();
    flatten_into("", document, &mut lines);
    lines.join("\n")
}

fn flatten_into(key: &str, value: &Value, lines: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (field, nested) in map {
                let nested_key = if key.is_empty() {
                    field.clone()
                } else {
                    format!("{}.{}", key, field)
                };
                flatten_into(&nested_key, nested, lines);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let item_key = format!("{}[{}]", key, i);
                match item {
                    Value::Array(_) => lines.push(format!("{}: {}", item_key, item)),
                    _ => flatten_into(&item_key, item, lines),
                }
            }
        }
        Value::String(s) if key.is_empty() => lines.push(s.clone()),
        Value::String(s) => lines.push(format!("{}: {}", key, s)),
        scalar if key.is_empty() => lines.push(scalar.to_string()),
        scalar => lines.push(format!("{}: {}", key, scalar)),
    }
}

/// Instruction given to the suggestion model for a flattened hackathon
#[inline]
pub fn dream_team_prompt(context: &str) -> String {
    format!(
        "You are given details about a hackathon:\n\n\
         {}\n\n\
         Based on this, generate a list of 10-20 technical skills that the 'dream team' \
         should have to maximize their chances of winning this hackathon. \
         Respond only with JSON of the form \
         {{\"hackathon_name\": string, \"required_skills\": [string]}}.",
        context
    )
}
