//! Pulling a proposal out of free-form model output.

use std::sync::LazyLock;

use regex::Regex;
use sentinel::analysis::RawProposal;
use serde_json::Value;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think pattern"));

/// A flat object that mentions `toolName`.
static FLAT_PROPOSAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\{[^{}]*"toolName"[^}]*\}"#).expect("valid proposal pattern"));

/// Find the proposal object in `text`.
///
/// Reasoning blocks are dropped and markdown fences unwrapped first. Then,
/// in order: a flat object naming `toolName`, the first balanced `{...}`,
/// and the whole remaining text are tried as JSON. Anything that parses
/// but is not an object is rejected.
pub fn extract_proposal(text: &str) -> Option<RawProposal> {
    let cleaned = THINK_BLOCK.replace_all(text, "");
    let body = unfence(cleaned.trim());

    if let Some(found) = FLAT_PROPOSAL.find(body) {
        if let Some(proposal) = parse_object(found.as_str()) {
            return Some(proposal);
        }
    }

    if let Some(candidate) = first_balanced_object(body) {
        if let Some(proposal) = parse_object(candidate) {
            return Some(proposal);
        }
    }

    parse_object(body)
}

fn unfence(text: &str) -> &str {
    if let Some((_, rest)) = text.split_once("```json") {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    let mut parts = text.split("```");
    match (parts.next(), parts.next()) {
        (Some(_), Some(inner)) => inner.trim(),
        _ => text,
    }
}

fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_object(candidate: &str) -> Option<RawProposal> {
    match serde_json::from_str::<Value>(candidate).ok()? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}
