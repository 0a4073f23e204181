//! Form validation shared by every webhook route.
//!
//! Failures are collected per field so a rejected request can report all of
//! its problems at once, the way Slack users expect from a slash command.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

pub const MISSING_FIELD: &str = "Missing data for required field.";

/// Field name → messages. Serializes as a plain JSON object.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(transparent)]
#[error("invalid fields: {}", self.describe())]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    fn describe(&self) -> String {
        self.0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Raw form-encoded request parameters.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(transparent)]
pub struct FormParams(HashMap<String, String>);

impl FormParams {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// A required field. Missing fields are recorded and yield `None`.
    pub fn required(&self, field: &str, errors: &mut ValidationErrors) -> Option<String> {
        match self.get(field) {
            Some(value) => Some(value.to_string()),
            None => {
                errors.add(field, MISSING_FIELD);
                None
            }
        }
    }

    /// A required field that must equal the configured shared secret.
    pub fn token(&self, field: &str, expected: &str, errors: &mut ValidationErrors) -> Option<String> {
        let value = self.required(field, errors)?;
        if value != expected {
            errors.add(field, "invalid token");
            return None;
        }
        Some(value)
    }

    /// A required absolute http(s) URL.
    pub fn url(&self, field: &str, errors: &mut ValidationErrors) -> Option<reqwest::Url> {
        let value = self.required(field, errors)?;
        match reqwest::Url::parse(&value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Some(url),
            _ => {
                errors.add(field, "Not a valid URL.");
                None
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Origin and destination from a `from: X to: Y` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locations {
    pub origin: String,
    pub destination: String,
}

/// Split `from: <origin> to: <destination>`; the markers may appear in
/// either order. Only the first occurrence of each marker counts.
pub fn parse_locations(text: &str) -> Result<Locations, String> {
    let invalid = || format!("\"{}\" is an invalid command", text);

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let from = tokens.iter().position(|t| *t == "from:").ok_or_else(invalid)?;
    let to = tokens.iter().position(|t| *t == "to:").ok_or_else(invalid)?;

    let span = |start: usize, other: usize| {
        let end = if start > other { tokens.len() } else { other };
        tokens[start + 1..end].join(" ")
    };
    let origin = span(from, to);
    let destination = span(to, from);

    if origin.is_empty() || destination.is_empty() {
        return Err(invalid());
    }
    Ok(Locations {
        origin,
        destination,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ear {
    L,
    R,
}

impl fmt::Display for Ear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ear::L => write!(f, "l"),
            Ear::R => write!(f, "r"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TinnitusReading {
    pub ear: Ear,
    pub audibility: u8,
    pub decibels: u16,
}

/// Parse a compact reading such as `L1120`: ear, audibility digit, decibels.
pub fn parse_tinnitus(text: &str) -> Result<TinnitusReading, String> {
    let text = text.trim();
    let mut chars = text.chars();
    let len = text.chars().count();
    if !(3..=5).contains(&len) {
        return Err("text must be 3 to 5 characters".to_string());
    }

    let ear_char = chars.next().unwrap_or_default().to_ascii_lowercase();
    let audibility_char = chars.next().unwrap_or_default();
    let decibels_text: String = chars.collect();

    let mut problems = Vec::new();

    let ear = match ear_char {
        'l' => Some(Ear::L),
        'r' => Some(Ear::R),
        _ => {
            problems.push("l or r are the only valid ear choices.");
            None
        }
    };

    let audibility = match audibility_char.to_digit(10) {
        Some(value) if value <= 2 => Some(value as u8),
        Some(_) => {
            problems.push("audibility must be between 0 and 2.");
            None
        }
        None => {
            problems.push("audibility must be an integer.");
            None
        }
    };

    let decibels = match decibels_text.trim().parse::<i32>() {
        Ok(value) if (0..=200).contains(&value) => Some(value as u16),
        Ok(_) => {
            problems.push("decibels must be between 0 and 200.");
            None
        }
        Err(_) => {
            problems.push("decibels must be an integer.");
            None
        }
    };

    match (ear, audibility, decibels) {
        (Some(ear), Some(audibility), Some(decibels)) => Ok(TinnitusReading {
            ear,
            audibility,
            decibels,
        }),
        _ => Err(problems.join(" ")),
    }
}
