//! Condition clause evaluation.
//!
//! A condition node carries an ordered clause list; the first clause that
//! holds selects its output label, otherwise the default label wins.
//! Grouped evaluation (AND/OR over a clause list against an arbitrary JSON
//! document) backs the wait-for-condition node.

use crate::context::path_lookup;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::fmt;

/// One side of a comparison: a context path or a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// Resolved against the evaluation document by dotted path.
    Path {
        /// The dotted path.
        context_path: String,
    },
    /// Used as-is.
    Literal(JsonValue),
}

/// Comparison operators.
///
/// The wire names match the workflow editor's operator strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[serde(rename = "==")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "not_exists")]
    NotExists,
    #[serde(rename = "is_empty")]
    IsEmpty,
    #[serde(rename = "is_not_empty")]
    IsNotEmpty,
    #[serde(rename = "matches")]
    Matches,
    #[serde(rename = "length_==")]
    LengthEquals,
    #[serde(rename = "length_>")]
    LengthGreaterThan,
    #[serde(rename = "length_<")]
    LengthLessThan,
}

/// A single comparison with the branch label it selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionClause {
    /// Left operand.
    pub left: Operand,
    /// The comparison operator.
    pub operator: ConditionOperator,
    /// Right operand; unary operators ignore it.
    #[serde(default)]
    pub right: Option<Operand>,
    /// Branch label selected when the clause holds.
    #[serde(default)]
    pub output: String,
}

/// How clauses combine in grouped evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicOperator {
    /// All clauses must hold.
    #[default]
    And,
    /// At least one clause must hold.
    Or,
}

/// Evaluation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// A `matches` clause has an invalid regular expression.
    InvalidRegex {
        /// The pattern text.
        pattern: String,
        /// The parser's message.
        message: String,
    },
    /// A `matches` clause needs a string pattern on the right.
    NonStringPattern,
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegex { pattern, message } => {
                write!(f, "invalid regex {pattern:?}: {message}")
            }
            Self::NonStringPattern => write!(f, "matches operator requires a string pattern"),
        }
    }
}

impl Error for ConditionError {}

/// The outcome of evaluating a condition node's clause list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionOutcome {
    /// The selected branch label.
    pub output: String,
    /// Whether any clause held.
    pub condition_met: bool,
    /// Index of the first clause that held.
    pub matched_condition_index: Option<usize>,
}

fn resolve_operand(operand: &Operand, data: &JsonValue) -> Option<JsonValue> {
    match operand {
        Operand::Path { context_path } => path_lookup(data, context_path).cloned(),
        Operand::Literal(value) => Some(value.clone()),
    }
}

/// Numeric coercion: numbers pass through, numeric strings parse, booleans
/// map to 1/0, everything else coerces to 0.
fn to_number(value: &JsonValue) -> f64 {
    match value {
        JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
        JsonValue::String(s) => s.trim().parse().unwrap_or(0.0),
        JsonValue::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn loose_equals(left: &JsonValue, right: &JsonValue) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (JsonValue::Number(_), JsonValue::String(_))
        | (JsonValue::String(_), JsonValue::Number(_))
        | (JsonValue::Number(_), JsonValue::Number(_)) => {
            (to_number(left) - to_number(right)).abs() < f64::EPSILON
        }
        _ => false,
    }
}

fn contains(haystack: &JsonValue, needle: &JsonValue) -> bool {
    match haystack {
        JsonValue::String(s) => s.contains(&as_text(needle)),
        JsonValue::Array(items) => items.iter().any(|item| loose_equals(item, needle)),
        JsonValue::Object(map) => match needle {
            JsonValue::String(key) => map.contains_key(key),
            _ => false,
        },
        _ => false,
    }
}

fn is_empty(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::String(s)) => s.is_empty(),
        Some(JsonValue::Array(items)) => items.is_empty(),
        Some(JsonValue::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn length_of(value: &JsonValue) -> f64 {
    match value {
        JsonValue::String(s) => s.chars().count() as f64,
        JsonValue::Array(items) => items.len() as f64,
        JsonValue::Object(map) => map.len() as f64,
        _ => 0.0,
    }
}

/// Evaluates a single clause against a JSON document.
pub fn clause_holds(clause: &ConditionClause, data: &JsonValue) -> Result<bool, ConditionError> {
    let left = resolve_operand(&clause.left, data);
    let right = clause
        .right
        .as_ref()
        .and_then(|operand| resolve_operand(operand, data));

    // Unary operators only look at the left side.
    match clause.operator {
        ConditionOperator::Exists => return Ok(left.is_some()),
        ConditionOperator::NotExists => return Ok(left.is_none()),
        ConditionOperator::IsEmpty => return Ok(is_empty(left.as_ref())),
        ConditionOperator::IsNotEmpty => return Ok(!is_empty(left.as_ref())),
        _ => {}
    }

    let left = left.unwrap_or(JsonValue::Null);
    let right = right.unwrap_or(JsonValue::Null);

    let holds = match clause.operator {
        ConditionOperator::Equals => loose_equals(&left, &right),
        ConditionOperator::NotEquals => !loose_equals(&left, &right),
        ConditionOperator::GreaterThan => to_number(&left) > to_number(&right),
        ConditionOperator::GreaterOrEqual => to_number(&left) >= to_number(&right),
        ConditionOperator::LessThan => to_number(&left) < to_number(&right),
        ConditionOperator::LessOrEqual => to_number(&left) <= to_number(&right),
        ConditionOperator::Contains => contains(&left, &right),
        ConditionOperator::NotContains => !contains(&left, &right),
        ConditionOperator::Matches => {
            let JsonValue::String(pattern) = &right else {
                return Err(ConditionError::NonStringPattern);
            };
            let regex = regex::Regex::new(pattern).map_err(|e| ConditionError::InvalidRegex {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            regex.is_match(&as_text(&left))
        }
        ConditionOperator::LengthEquals => {
            (length_of(&left) - to_number(&right)).abs() < f64::EPSILON
        }
        ConditionOperator::LengthGreaterThan => length_of(&left) > to_number(&right),
        ConditionOperator::LengthLessThan => length_of(&left) < to_number(&right),
        ConditionOperator::Exists
        | ConditionOperator::NotExists
        | ConditionOperator::IsEmpty
        | ConditionOperator::IsNotEmpty => unreachable!("handled above"),
    };
    Ok(holds)
}

/// First-match-wins evaluation of a condition node's clause list.
pub fn evaluate_clauses(
    clauses: &[ConditionClause],
    default_output: &str,
    data: &JsonValue,
) -> Result<ConditionOutcome, ConditionError> {
    for (index, clause) in clauses.iter().enumerate() {
        if clause_holds(clause, data)? {
            return Ok(ConditionOutcome {
                output: clause.output.clone(),
                condition_met: true,
                matched_condition_index: Some(index),
            });
        }
    }
    Ok(ConditionOutcome {
        output: default_output.to_string(),
        condition_met: false,
        matched_condition_index: None,
    })
}

/// Combines clause results under AND/OR; also returns per-clause results.
pub fn evaluate_group(
    clauses: &[ConditionClause],
    logic: LogicOperator,
    data: &JsonValue,
) -> Result<(bool, Vec<bool>), ConditionError> {
    let mut details = Vec::with_capacity(clauses.len());
    for clause in clauses {
        details.push(clause_holds(clause, data)?);
    }
    let combined = match logic {
        LogicOperator::And => details.iter().all(|held| *held),
        LogicOperator::Or => details.iter().any(|held| *held),
    };
    Ok((combined, details))
}
