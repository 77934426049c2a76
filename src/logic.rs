//! Conditional field logic.
//!
//! Every field carries its own ordered rule list. Rules only ever read the raw
//! submitted values, never another field's computed state, so evaluation is a
//! single pass per field with no ordering between fields.
//!
//! Comparisons follow the coercion rules form authors expect from the browser
//! editor: `"5" equals 5`, `true equals 1`, and numeric operators treat
//! anything non-numeric as NaN, which compares false against everything.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::schema::{ConditionType, FormField, FormSchema, LogicAction, LogicCondition, LogicOperator, LogicRule};

/// Current form input, keyed by field id.
pub type FormData = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldState {
    pub visible: bool,
    pub required: bool,
    pub disabled: bool,
}

pub fn evaluate_condition(condition: &LogicCondition, form_data: &FormData) -> bool {
    let field_value = form_data.get(&condition.field_id);
    let target = &condition.value;

    match condition.operator {
        LogicOperator::Equals => loose_eq(field_value, target),
        LogicOperator::NotEquals => !loose_eq(field_value, target),
        LogicOperator::Contains => match field_value {
            Some(Value::String(s)) => s
                .to_lowercase()
                .contains(&to_js_string(target).to_lowercase()),
            Some(Value::Array(items)) => items.iter().any(|item| same_value_zero(item, target)),
            _ => false,
        },
        LogicOperator::Gt => to_number(field_value) > to_number(Some(target)),
        LogicOperator::Lt => to_number(field_value) < to_number(Some(target)),
        LogicOperator::Gte => to_number(field_value) >= to_number(Some(target)),
        LogicOperator::Lte => to_number(field_value) <= to_number(Some(target)),
        LogicOperator::Unknown => false,
    }
}

pub fn evaluate_rule(rule: &LogicRule, form_data: &FormData) -> bool {
    if rule.conditions.is_empty() {
        return false;
    }

    match rule.condition_type {
        ConditionType::And => rule
            .conditions
            .iter()
            .all(|c| evaluate_condition(c, form_data)),
        ConditionType::Or => rule
            .conditions
            .iter()
            .any(|c| evaluate_condition(c, form_data)),
    }
}

/// Compute a field's state by applying each matching rule in declaration order.
/// Later rules overwrite whatever earlier rules set on the same attribute.
pub fn evaluate_field_logic(field: &FormField, form_data: &FormData) -> FieldState {
    let mut state = FieldState {
        visible: true,
        required: field.required,
        disabled: false,
    };

    for rule in &field.logic {
        if !evaluate_rule(rule, form_data) {
            continue;
        }
        match rule.action {
            LogicAction::Show => state.visible = true,
            LogicAction::Hide => state.visible = false,
            LogicAction::Require => state.required = true,
            LogicAction::Disable => state.disabled = true,
            // Paging is decided by the renderer.
            LogicAction::SkipPage | LogicAction::Unknown => {}
        }
    }

    state
}

pub fn evaluate_all_field_logic(
    schema: &FormSchema,
    form_data: &FormData,
) -> HashMap<String, FieldState> {
    schema
        .fields
        .iter()
        .map(|field| (field.id.clone(), evaluate_field_logic(field, form_data)))
        .collect()
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Loose equality between a (possibly absent) field value and a rule target.
/// An absent value only equals null.
fn loose_eq(field_value: Option<&Value>, target: &Value) -> bool {
    match field_value {
        None => target.is_null(),
        Some(v) => loose_eq_values(v, target),
    }
}

fn loose_eq_values(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(_), Value::Number(_)) => to_number(Some(a)) == to_number(Some(b)),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        // Distinct containers are never the same instance.
        (Value::Array(_) | Value::Object(_), Value::Array(_) | Value::Object(_)) => false,
        (Value::Bool(_), _) => loose_eq_values(&bool_as_number(a), b),
        (_, Value::Bool(_)) => loose_eq_values(a, &bool_as_number(b)),
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            to_number(Some(a)) == to_number(Some(b))
        }
        (Value::Array(_) | Value::Object(_), _) => {
            loose_eq_values(&Value::String(to_js_string(a)), b)
        }
        (_, Value::Array(_) | Value::Object(_)) => {
            loose_eq_values(a, &Value::String(to_js_string(b)))
        }
    }
}

fn bool_as_number(v: &Value) -> Value {
    Value::from(if v.as_bool() == Some(true) { 1 } else { 0 })
}

/// Membership test used by `contains` on list values: strict type and value,
/// with NaN never occurring in JSON input.
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => to_number(Some(a)) == to_number(Some(b)),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

pub(crate) fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_numeric_str(s),
        Some(v @ Value::Array(_)) => parse_numeric_str(&to_js_string(v)),
        Some(Value::Object(_)) => f64::NAN,
    }
}

fn parse_numeric_str(raw: &str) -> f64 {
    let s = raw.trim();
    if s.is_empty() {
        return 0.0;
    }

    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&s[2..], radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }

    // Rust also accepts "inf"/"nan" spellings, which are not numbers here.
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

pub(crate) fn to_js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        // f64 Display drops the trailing ".0" the way the editor prints numbers.
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => f.to_string(),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".into(),
    }
}
