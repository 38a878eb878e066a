//! Parsing of `control` text into an ordered field map.
//!
//! Fields are `Key: value` lines. A line starting with whitespace continues
//! the previous field; it is trimmed and joined to the value with a single
//! space.

use indexmap::IndexMap;
use thiserror::Error;

pub type ControlFields = IndexMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("invalid package-field {0:?}")]
    InvalidField(String),
}

pub fn parse_control(control: &str) -> Result<ControlFields, ControlError> {
    let mut fields = ControlFields::new();
    let mut current: Option<(String, String)> = None;

    for line in control.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if line.starts_with([' ', '\t']) {
            match current.as_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                None => return Err(ControlError::InvalidField(line.to_string())),
            }
            continue;
        }

        if let Some((key, value)) = current.take() {
            fields.insert(key, value);
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ControlError::InvalidField(line.to_string()))?;
        current = Some((key.to_string(), value.trim().to_string()));
    }

    if let Some((key, value)) = current {
        fields.insert(key, value);
    }
    Ok(fields)
}
