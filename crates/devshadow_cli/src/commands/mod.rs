//! CLI command implementations.

pub mod format;
pub mod simulate;

use devshadow_protocol::{AttrKind, AttrValue};
use thiserror::Error;

/// Error in a `name=value` argument.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The argument has no `=`.
    #[error("expected name=value, got '{0}'")]
    MissingSeparator(String),

    /// The name part is empty.
    #[error("empty attribute name in '{0}'")]
    EmptyName(String),
}

/// Parses `name=value` arguments, inferring each value's kind.
pub fn parse_fields(args: &[String]) -> Result<Vec<(String, AttrValue)>, FieldError> {
    args.iter().map(|arg| parse_field(arg)).collect()
}

fn parse_field(arg: &str) -> Result<(String, AttrValue), FieldError> {
    let (name, text) = arg
        .split_once('=')
        .ok_or_else(|| FieldError::MissingSeparator(arg.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(FieldError::EmptyName(arg.to_string()));
    }
    Ok((name.to_string(), infer_value(text)))
}

/// Picks the narrowest kind the text parses as, falling back to a string.
pub fn infer_value(text: &str) -> AttrValue {
    [AttrKind::Null, AttrKind::Bool, AttrKind::Int, AttrKind::Float]
        .into_iter()
        .find_map(|kind| AttrValue::parse(text, kind))
        .unwrap_or_else(|| AttrValue::from(text))
}
