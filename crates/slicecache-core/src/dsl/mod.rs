//! Module: dsl
//! Responsibility: parse the constraint surface planning needs:
//! `context(key:value)`, `window(start:end)`, `cohort(start:end)`.
//! Does not own: any other query clause; those are rejected as unknown.
//! Boundary: produces plain values (assignment, range, temporal mode).


use crate::{
    signature::TemporalMode,
    slice::{DimensionAssignment, normalize_key},
    types::{Date, DateRange, RangeError},
};
use std::fmt;
use thiserror::Error as ThisError;

/// Furthest a relative `-Nd` date may reach back, about a century.
pub const MAX_RELATIVE_DAYS: i32 = 36_525;

///
/// DslError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum DslError {
    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown clause '{0}'")]
    UnknownClause(String),

    #[error("malformed context clause '{0}', expected key:value")]
    MalformedContext(String),

    #[error("dimension '{0}' constrained more than once")]
    DuplicateContext(String),

    #[error("invalid date '{0}'")]
    InvalidDate(String),

    #[error("window and cohort are mutually exclusive and may appear once")]
    ConflictingRange,

    #[error("no window or cohort clause")]
    MissingRange,

    #[error(transparent)]
    Range(#[from] RangeError),
}

///
/// Constraints
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Constraints {
    pub assignment: DimensionAssignment,
    pub range: DateRange,
    pub mode: TemporalMode,
}

impl fmt::Display for Constraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.assignment.is_empty() {
            write!(f, "{}.", self.assignment.canonical())?;
        }
        write!(f, "{}({})", self.mode, self.range)
    }
}

/// Parse a constraint string such as
/// `context(channel:google).window(1-Jan-25:-7d)`.
///
/// Relative dates (`-Nd`) and an empty range end resolve against `today`.
pub fn parse_constraints(text: &str, today: Date) -> Result<Constraints, DslError> {
    let mut assignment = DimensionAssignment::empty();
    let mut temporal: Option<(TemporalMode, DateRange)> = None;

    for clause in Clauses::new(text) {
        let clause = clause?;
        match clause.name {
            "context" => {
                let (key, value) = clause
                    .body
                    .split_once(':')
                    .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
                    .ok_or_else(|| DslError::MalformedContext(clause.body.to_string()))?;
                if assignment.insert(key, value).is_some() {
                    return Err(DslError::DuplicateContext(normalize_key(key)));
                }
            }
            "window" | "cohort" => {
                if temporal.is_some() {
                    return Err(DslError::ConflictingRange);
                }
                let mode = if clause.name == "window" {
                    TemporalMode::Window
                } else {
                    TemporalMode::Cohort
                };
                temporal = Some((mode, parse_range(clause.body, today)?));
            }
            other => return Err(DslError::UnknownClause(other.to_string())),
        }
    }

    let (mode, range) = temporal.ok_or(DslError::MissingRange)?;

    Ok(Constraints {
        assignment,
        range,
        mode,
    })
}

fn parse_range(body: &str, today: Date) -> Result<DateRange, DslError> {
    let (start, end) = body
        .split_once(':')
        .ok_or_else(|| DslError::InvalidDate(body.to_string()))?;
    let start = parse_date(start, today)?;
    let end = if end.trim().is_empty() {
        today
    } else {
        parse_date(end, today)?
    };

    Ok(DateRange::new(start, end)?)
}

fn parse_date(token: &str, today: Date) -> Result<Date, DslError> {
    let token = token.trim();
    let invalid = || DslError::InvalidDate(token.to_string());

    if let Some(days) = token.strip_prefix('-').and_then(|t| t.strip_suffix('d')) {
        let days: i32 = days.parse().map_err(|_| invalid())?;
        if !(0..=MAX_RELATIVE_DAYS).contains(&days) {
            return Err(invalid());
        }

        return Ok(today.add_days(-days));
    }

    Date::parse_any(token).ok_or_else(invalid)
}

///
/// Clause
///

struct Clause<'a> {
    name: &'a str,
    body: &'a str,
}

// Splits `name(body).name(body)` into clauses; bodies may not contain ')'.
struct Clauses<'a> {
    text: &'a str,
    pos: usize,
    failed: bool,
}

impl<'a> Clauses<'a> {
    const fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            failed: false,
        }
    }

    fn syntax(&mut self, offset: usize, message: &str) -> Option<Result<Clause<'a>, DslError>> {
        self.failed = true;
        Some(Err(DslError::Syntax {
            offset,
            message: message.to_string(),
        }))
    }
}

impl<'a> Iterator for Clauses<'a> {
    type Item = Result<Clause<'a>, DslError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let rest = &self.text[self.pos..];
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            return None;
        }
        let start = self.pos + (rest.len() - trimmed.len());

        let Some(open) = trimmed.find('(') else {
            return self.syntax(start, "expected '('");
        };
        let name = trimmed[..open].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphabetic() || c == '_') {
            return self.syntax(start, "expected clause name");
        }
        let Some(close) = trimmed[open..].find(')') else {
            return self.syntax(start + open, "unclosed '('");
        };
        let body = &trimmed[open + 1..open + close];

        let mut next = start + open + close + 1;
        let after = self.text[next..].trim_start();
        if let Some(stripped) = after.strip_prefix('.') {
            next = self.text.len() - stripped.len();
            if stripped.trim().is_empty() {
                return self.syntax(next, "trailing '.'");
            }
        } else if !after.is_empty() {
            return self.syntax(self.text.len() - after.len(), "expected '.' between clauses");
        }
        self.pos = next;

        Some(Ok(Clause { name, body }))
    }
}
