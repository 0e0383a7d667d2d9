//! Routing rules: predicate-guarded mappings from event types to platforms.
//!
//! On disk a rule's conditions are a JSON map of `field → predicate`, where a
//! predicate is either a bare scalar (equality) or an object of operator
//! keys. At load time the map is parsed into the typed [`Condition`]
//! variants; evaluation is a conjunction over all parsed conditions.
//!
//! Besides the event's own fields, conditions can reference virtual fields
//! computed on the fly: `email_domain`, `has_phone`, `revenue_amount`,
//! `is_gmail`, and `is_mobile`.

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::{Event, EventType};

/// A single parsed predicate.
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    NotEq(Value),
    Contains(String),
    NotContains(String),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Gt(f64),
    Lt(f64),
    Regex(Regex),
}

impl Condition {
    /// Evaluate this predicate against a resolved field value.
    ///
    /// Absent fields resolve to `Null`: negated operators succeed against
    /// `Null`, everything else fails.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Condition::Eq(expected) => loose_eq(value, expected),
            Condition::NotEq(expected) => !loose_eq(value, expected),
            Condition::Contains(needle) => contains_ci(value, needle),
            Condition::NotContains(needle) => !contains_ci(value, needle),
            Condition::In(set) => set.iter().any(|v| loose_eq(value, v)),
            Condition::NotIn(set) => !set.iter().any(|v| loose_eq(value, v)),
            Condition::Gt(threshold) => as_number(value).is_some_and(|n| n > *threshold),
            Condition::Lt(threshold) => as_number(value).is_some_and(|n| n < *threshold),
            Condition::Regex(re) => as_string(value).is_some_and(|s| re.is_match(&s)),
        }
    }
}

/// A predicate-guarded mapping from an event type to a platform.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub id: i64,
    pub event_type: EventType,
    pub platform_id: i64,
    /// Conjunction: all must hold.
    pub conditions: Vec<(String, Condition)>,
    /// Lower runs first.
    pub priority: i64,
    pub is_active: bool,
}

impl RoutingRule {
    /// Whether every condition holds for `event`.
    pub fn matches(&self, event: &Event) -> bool {
        self.conditions
            .iter()
            .all(|(field, cond)| cond.matches(&field_value(event, field)))
    }
}

/// Parse the on-disk `field → predicate` JSON into typed conditions.
///
/// A bare scalar predicate means equality; an object may carry several
/// operator keys, each contributing one condition on the same field.
pub fn parse_conditions(raw: &Value) -> Result<Vec<(String, Condition)>> {
    let map = match raw {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        _ => {
            return Err(Error::InvalidCondition {
                field: "<root>".to_string(),
                reason: "conditions must be a JSON object".to_string(),
            })
        }
    };

    let mut parsed = Vec::new();
    for (field, predicate) in map {
        match predicate {
            Value::Object(ops) => {
                for (op, arg) in ops {
                    parsed.push((field.clone(), parse_operator(field, op, arg)?));
                }
            }
            scalar => parsed.push((field.clone(), Condition::Eq(scalar.clone()))),
        }
    }
    Ok(parsed)
}

fn parse_operator(field: &str, op: &str, arg: &Value) -> Result<Condition> {
    let bad = |reason: &str| Error::InvalidCondition {
        field: field.to_string(),
        reason: reason.to_string(),
    };
    match op {
        "equals" => Ok(Condition::Eq(arg.clone())),
        "not_equals" => Ok(Condition::NotEq(arg.clone())),
        "contains" => as_string(arg)
            .map(Condition::Contains)
            .ok_or_else(|| bad("contains requires a string")),
        "not_contains" => as_string(arg)
            .map(Condition::NotContains)
            .ok_or_else(|| bad("not_contains requires a string")),
        "in" => match arg {
            Value::Array(items) => Ok(Condition::In(items.clone())),
            _ => Err(bad("in requires a list")),
        },
        "not_in" => match arg {
            Value::Array(items) => Ok(Condition::NotIn(items.clone())),
            _ => Err(bad("not_in requires a list")),
        },
        "greater_than" => as_number(arg)
            .map(Condition::Gt)
            .ok_or_else(|| bad("greater_than requires a number")),
        "less_than" => as_number(arg)
            .map(Condition::Lt)
            .ok_or_else(|| bad("less_than requires a number")),
        "regex" => {
            let pattern = as_string(arg).ok_or_else(|| bad("regex requires a string"))?;
            Ok(Condition::Regex(Regex::new(&pattern)?))
        }
        other => Err(bad(&format!("unknown operator '{other}'"))),
    }
}

/// Resolve an event field (typed, virtual, or `event_data`) to a JSON value.
pub fn field_value(event: &Event, field: &str) -> Value {
    let opt_str = |v: &Option<String>| v.clone().map(Value::String).unwrap_or(Value::Null);

    match field {
        // Virtual fields
        "email_domain" => event
            .email
            .as_deref()
            .and_then(|e| e.split_once('@'))
            .map(|(_, domain)| Value::String(domain.to_string()))
            .unwrap_or(Value::Null),
        "has_phone" => Value::Bool(event.phone.as_deref().is_some_and(|p| !p.is_empty())),
        "revenue_amount" => json_f64(event.revenue_amount()),
        "is_gmail" => Value::Bool(
            event
                .email
                .as_deref()
                .is_some_and(|e| e.to_lowercase().ends_with("@gmail.com")),
        ),
        "is_mobile" => Value::Bool(
            event
                .phone
                .as_deref()
                .is_some_and(|p| p.chars().filter(|c| c.is_ascii_digit()).count() >= 10),
        ),

        // Typed fields
        "event_type" => Value::String(event.event_type.as_str().to_string()),
        "email" => opt_str(&event.email),
        "phone" => opt_str(&event.phone),
        "first_name" => opt_str(&event.first_name),
        "last_name" => opt_str(&event.last_name),
        "ip" | "ip_address" => opt_str(&event.ip_address),
        "source" => opt_str(&event.cur_source),
        "medium" => opt_str(&event.cur_medium),
        "campaign" => opt_str(&event.cur_campaign),
        "content" => opt_str(&event.cur_content),
        "term" => opt_str(&event.cur_term),
        "gclid" => opt_str(&event.gclid),
        "ga_client_id" => opt_str(&event.ga_client_id),
        "acq_source" => opt_str(&event.acq_source),
        "acq_campaign" => opt_str(&event.acq_campaign),
        "acq_term" => opt_str(&event.acq_term),
        "acq_date" => opt_str(&event.acq_date),
        "acq_form_title" => opt_str(&event.acq_form_title),
        "offer" | "purchase_offer" => opt_str(&event.purchase_offer),
        "publisher" | "purchase_publisher" => opt_str(&event.purchase_publisher),
        "amount" | "purchase_amount" => event
            .purchase_amount
            .map(json_f64)
            .unwrap_or(Value::Null),
        "traffic_source" => opt_str(&event.traffic_source),
        "email_validation_status" => event
            .email_validation_status
            .map(|s| Value::String(s.as_str().to_string()))
            .unwrap_or(Value::Null),

        // Fallback: platform-specific additions
        other => event.event_data.get(other).cloned().unwrap_or(Value::Null),
    }
}

fn json_f64(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Loose equality: numeric when both sides coerce to numbers, otherwise
/// stringified comparison. `Null` only equals `Null`.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return a.is_null() && b.is_null();
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    match (as_string(a), as_string(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn contains_ci(value: &Value, needle: &str) -> bool {
    as_string(value).is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase()))
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
