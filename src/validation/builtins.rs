//! Builtin validators

use super::rule::{BuiltinRule, CompareOp, PasswordLevel, ValidatorOutput};
use crate::data::path::{get_in, parse_path};
use regex::Regex;
use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::OnceLock;

const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// Null, blank string, empty array or empty object
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Numeric reading of a value; numeric strings count, booleans are 0/1
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn length_of(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => other.to_string().chars().count(),
    }
}

fn matches_cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> bool {
    cell.get_or_init(|| {
        Regex::new(pattern)
            .map_err(|err| tracing::error!("builtin pattern failed to compile: {err}"))
            .ok()
    })
    .as_ref()
    .is_some_and(|re| re.is_match(text))
}

macro_rules! pattern_check {
    ($pattern:expr, $text:expr) => {{
        static CELL: OnceLock<Option<Regex>> = OnceLock::new();
        matches_cached(&CELL, $pattern, $text)
    }};
}

fn luhn(digits: &str) -> bool {
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| match (i % 2 == 1, d * 2) {
            (true, doubled) if doubled > 9 => doubled - 9,
            (true, doubled) => doubled,
            (false, _) => d,
        })
        .sum();
    sum % 10 == 0
}

fn password_ok(level: PasswordLevel, password: &str) -> bool {
    let long_enough = |n| password.chars().count() >= n;
    let has = |pred: fn(char) -> bool| password.chars().any(pred);
    match level {
        PasswordLevel::Weak => long_enough(6),
        PasswordLevel::Medium => {
            long_enough(8) && has(|c| c.is_ascii_digit()) && has(|c| c.is_ascii_alphabetic())
        }
        PasswordLevel::Strong => {
            long_enough(8)
                && has(|c| c.is_ascii_lowercase())
                && has(|c| c.is_ascii_uppercase())
                && has(|c| c.is_ascii_digit())
                && has(|c| SPECIAL_CHARS.contains(c))
        }
    }
}

fn password_message(level: PasswordLevel) -> &'static str {
    match level {
        PasswordLevel::Weak => "Password must be at least 6 characters",
        PasswordLevel::Medium => "Password must be at least 8 characters and contain letters and digits",
        PasswordLevel::Strong => {
            "Password must be at least 8 characters and contain upper and lower case letters, digits and symbols"
        }
    }
}

fn compare(op: CompareOp, left: f64, right: f64) -> bool {
    match op {
        CompareOp::Gt => left > right,
        CompareOp::Gte => left >= right,
        CompareOp::Lt => left < right,
        CompareOp::Lte => left <= right,
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
    }
}

fn compare_message(op: CompareOp, field: &str) -> String {
    let relation = match op {
        CompareOp::Gt => "greater than",
        CompareOp::Gte => "greater than or equal to",
        CompareOp::Lt => "less than",
        CompareOp::Lte => "less than or equal to",
        CompareOp::Eq => "equal to",
        CompareOp::Ne => "different from",
    };
    format!("Must be {relation} {field}")
}

fn value_at<'a>(values: &'a Value, path: &str) -> Option<&'a Value> {
    parse_path(path).ok().and_then(|segments| get_in(values, &segments))
}

/// Run a builtin. Every rule except `required` passes on empty values.
/// `message` replaces the default failure message.
pub fn run(rule: &BuiltinRule, value: &Value, values: &Value, message: Option<&str>) -> ValidatorOutput {
    if !matches!(rule, BuiltinRule::Required) && is_empty_value(value) {
        return ValidatorOutput::pass();
    }

    let text = as_text(value);
    let (valid, default_message) = match rule {
        BuiltinRule::Required => (!is_empty_value(value), "This field is required".to_string()),
        BuiltinRule::Email => (
            pattern_check!(r"^[^\s@]+@[^\s@]+\.[^\s@]+$", &text),
            "Please enter a valid email address".to_string(),
        ),
        BuiltinRule::Url => (
            pattern_check!(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://[^\s/?#]+\S*$", &text),
            "Please enter a valid URL".to_string(),
        ),
        BuiltinRule::Phone => (
            pattern_check!(r"^1[3-9]\d{9}$", &text),
            "Please enter a valid phone number".to_string(),
        ),
        BuiltinRule::Number => (
            as_number(value).is_some(),
            "Please enter a valid number".to_string(),
        ),
        BuiltinRule::Integer => (
            as_number(value).is_some_and(|n| n.fract() == 0.0),
            "Please enter a valid integer".to_string(),
        ),
        BuiltinRule::Min(min) => (
            as_number(value).is_some_and(|n| n >= *min),
            format!("Value must not be less than {min}"),
        ),
        BuiltinRule::Max(max) => (
            as_number(value).is_some_and(|n| n <= *max),
            format!("Value must not be greater than {max}"),
        ),
        BuiltinRule::Range { min, max } => (
            as_number(value).is_some_and(|n| n >= *min && n <= *max),
            format!("Value must be between {min} and {max}"),
        ),
        BuiltinRule::MinLength(min) => (
            length_of(value) >= *min,
            format!("Length must be at least {min} characters"),
        ),
        BuiltinRule::MaxLength(max) => (
            length_of(value) <= *max,
            format!("Length must not exceed {max} characters"),
        ),
        BuiltinRule::Length { min, max } => {
            let len = length_of(value);
            (
                len >= *min && len <= *max,
                format!("Length must be between {min} and {max} characters"),
            )
        }
        BuiltinRule::Pattern(re) => (re.is_match(&text), "Invalid format".to_string()),
        BuiltinRule::OneOf(options) => (
            options.contains(value),
            "Value is not one of the allowed options".to_string(),
        ),
        BuiltinRule::Confirm(target) => (
            value_at(values, target) == Some(value),
            "The two values do not match".to_string(),
        ),
        BuiltinRule::CompareWith { field, op } => {
            let other = value_at(values, field).filter(|other| !is_empty_value(other));
            let Some(other) = other else {
                return ValidatorOutput::pass();
            };
            let valid = match (as_number(value), as_number(other)) {
                (Some(left), Some(right)) => compare(*op, left, right),
                _ => false,
            };
            (valid, compare_message(*op, field))
        }
        BuiltinRule::IdCard => (
            pattern_check!(r"^(\d{15}|\d{18}|\d{17}[\dXx])$", &text),
            "Please enter a valid ID card number".to_string(),
        ),
        BuiltinRule::CreditCard => {
            let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            if !digits.chars().all(|c| c.is_ascii_digit()) {
                return ValidatorOutput::fail(
                    message.unwrap_or("Credit card number may only contain digits"),
                );
            }
            (luhn(&digits), "Please enter a valid credit card number".to_string())
        }
        BuiltinRule::Ip => (
            text.parse::<Ipv4Addr>().is_ok(),
            "Please enter a valid IP address".to_string(),
        ),
        BuiltinRule::PostalCode => (
            pattern_check!(r"^[1-9]\d{5}$", &text),
            "Please enter a valid postal code".to_string(),
        ),
        BuiltinRule::FileType(types) => {
            let ext = text.rsplit('.').next().unwrap_or_default().to_lowercase();
            (
                text.contains('.') && types.iter().any(|t| t.to_lowercase() == ext),
                format!("File type must be one of: {}", types.join(", ")),
            )
        }
        BuiltinRule::PasswordStrength(level) => (
            password_ok(*level, &text),
            password_message(*level).to_string(),
        ),
    };

    if valid {
        ValidatorOutput::pass()
    } else {
        ValidatorOutput::fail(message.map(str::to_string).unwrap_or(default_message))
    }
}
