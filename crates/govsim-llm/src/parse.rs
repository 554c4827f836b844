//! Answer parsing
//!
//! Every prompt asks the model to finish with a JSON object. Free-form
//! reasoning before it is allowed; the last top-level object wins.

use govsim_core::{OracleCall, OracleError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Last top-level JSON object embedded in `text`.
pub fn last_json_object(text: &str) -> Option<Value> {
    let mut found = None;
    let mut pos = 0;
    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => {
                pos = start + stream.byte_offset();
                found = Some(value);
            }
            _ => pos = start + 1,
        }
    }
    found
}

pub fn parse_answer<T: DeserializeOwned>(call: OracleCall, text: &str) -> Result<T, OracleError> {
    let value = last_json_object(text)
        .ok_or_else(|| OracleError::malformed(call.as_str(), "no JSON object in answer"))?;
    serde_json::from_value(value).map_err(|e| OracleError::malformed(call.as_str(), e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct HarvestAnswer {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct NominationAnswer {
    #[serde(default)]
    pub partner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnAnswer {
    pub utterance: String,
    #[serde(default)]
    pub end_conversation: bool,
}

#[derive(Debug, Deserialize)]
pub struct GroupTurnAnswer {
    pub utterance: String,
    #[serde(default)]
    pub end_conversation: bool,
    #[serde(default)]
    pub next_speaker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryAnswer {
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub struct CeilingAnswer {
    #[serde(default)]
    pub ceiling: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct InsightsAnswer {
    #[serde(default)]
    pub insights: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ThoughtAnswer {
    pub thought: String,
}

/// `None`, empty and "none" all mean nobody.
pub fn is_no_one(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.eq_ignore_ascii_case("none") || name.eq_ignore_ascii_case("nobody")
}
