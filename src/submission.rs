//! Submit-time preparation: value transforms and validation against the
//! field states the logic rules produce.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logic::{evaluate_all_field_logic, to_number, FormData};
use crate::schema::{FieldType, FormSchema, Transform};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Required,
    TooShort,
    TooLong,
    BelowMinimum,
    AboveMaximum,
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field_id: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

/// Apply each field's configured transforms to its textual value.
/// Transforms always run uppercase, then lowercase, then trim.
pub fn apply_transforms(schema: &FormSchema, data: &FormData) -> FormData {
    let mut out = data.clone();
    for field in &schema.fields {
        if field.transform.is_empty() {
            continue;
        }
        if let Some(Value::String(s)) = out.get_mut(&field.id) {
            let mut value = std::mem::take(s);
            if field.transform.contains(&Transform::Uppercase) {
                value = value.to_uppercase();
            }
            if field.transform.contains(&Transform::Lowercase) {
                value = value.to_lowercase();
            }
            if field.transform.contains(&Transform::Trim) {
                value = value.trim().to_string();
            }
            *s = value;
        }
    }
    out
}

/// Validate a submission. Hidden fields are skipped entirely; whether a field
/// is required comes from its evaluated state, not its static flag.
pub fn validate_submission(schema: &FormSchema, data: &FormData) -> Vec<FieldError> {
    let states = evaluate_all_field_logic(schema, data);
    let mut errors = Vec::new();

    for field in &schema.fields {
        let Some(state) = states.get(&field.id) else {
            continue;
        };
        if !state.visible {
            continue;
        }

        let label = if field.label.is_empty() {
            field.id.as_str()
        } else {
            field.label.as_str()
        };
        let value = data.get(&field.id);

        if is_empty(value) {
            if state.required {
                errors.push(FieldError {
                    field_id: field.id.clone(),
                    kind: FieldErrorKind::Required,
                    message: format!("{label} is required"),
                });
            }
            continue;
        }

        if let Some(Value::String(text)) = value {
            let len = text.chars().count();
            if let Some(min) = field.min_length {
                if len < min {
                    errors.push(FieldError {
                        field_id: field.id.clone(),
                        kind: FieldErrorKind::TooShort,
                        message: format!("Minimum {min} characters required"),
                    });
                }
            }
            if let Some(max) = field.max_length {
                if len > max {
                    errors.push(FieldError {
                        field_id: field.id.clone(),
                        kind: FieldErrorKind::TooLong,
                        message: format!("Maximum {max} characters allowed"),
                    });
                }
            }
            if let Some(pattern) = &field.pattern {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(text) => errors.push(FieldError {
                        field_id: field.id.clone(),
                        kind: FieldErrorKind::Pattern,
                        message: field
                            .pattern_error
                            .clone()
                            .unwrap_or_else(|| "Invalid format".into()),
                    }),
                    Ok(_) => {}
                    // An unparsable author pattern cannot be enforced.
                    Err(e) => tracing::debug!(field_id = %field.id, "ignoring invalid pattern: {e}"),
                }
            }
        }

        if field.field_type == FieldType::Number {
            let n = to_number(value);
            if let Some(min) = field.min {
                if n < min {
                    errors.push(FieldError {
                        field_id: field.id.clone(),
                        kind: FieldErrorKind::BelowMinimum,
                        message: format!("Minimum value is {min}"),
                    });
                }
            }
            if let Some(max) = field.max {
                if n > max {
                    errors.push(FieldError {
                        field_id: field.id.clone(),
                        kind: FieldErrorKind::AboveMaximum,
                        message: format!("Maximum value is {max}"),
                    });
                }
            }
        }
    }

    errors
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ConditionType, FormField, LogicAction, LogicCondition, LogicOperator, LogicRule};
    use serde_json::json;

    fn data(v: Value) -> FormData {
        v.as_object().cloned().unwrap()
    }

    fn schema(fields: Vec<FormField>) -> FormSchema {
        FormSchema {
            title: "t".into(),
            fields,
        }
    }

    #[test]
    fn transforms_apply_in_fixed_order() {
        let mut name = FormField::new("name", FieldType::Text);
        name.transform = vec![Transform::Trim, Transform::Uppercase];
        let mut code = FormField::new("code", FieldType::Text);
        code.transform = vec![Transform::Lowercase, Transform::Uppercase];
        let mut count = FormField::new("count", FieldType::Number);
        count.transform = vec![Transform::Trim];

        let out = apply_transforms(
            &schema(vec![name, code, count]),
            &data(json!({ "name": "  ada  ", "code": "MiXeD", "count": 3, "extra": " x " })),
        );
        assert_eq!(out["name"], json!("ADA"));
        // Lowercase runs after uppercase regardless of listing order.
        assert_eq!(out["code"], json!("mixed"));
        assert_eq!(out["count"], json!(3));
        assert_eq!(out["extra"], json!(" x "));
    }

    #[test]
    fn required_follows_computed_state() {
        let mut email = FormField::new("email", FieldType::Text);
        email.label = "Email".into();
        email.logic = vec![LogicRule {
            id: "r1".into(),
            conditions: vec![LogicCondition {
                field_id: "country".into(),
                operator: LogicOperator::Equals,
                value: json!("US"),
            }],
            condition_type: ConditionType::And,
            action: LogicAction::Require,
        }];
        let s = schema(vec![FormField::new("country", FieldType::Select), email]);

        let errors = validate_submission(&s, &data(json!({ "country": "US", "email": "  " })));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, FieldErrorKind::Required);
        assert_eq!(errors[0].message, "Email is required");

        assert!(validate_submission(&s, &data(json!({ "country": "CA" }))).is_empty());
    }

    #[test]
    fn hidden_required_fields_are_skipped() {
        let mut reason = FormField::new("reason", FieldType::Textarea);
        reason.required = true;
        reason.logic = vec![LogicRule {
            id: "r1".into(),
            conditions: vec![LogicCondition {
                field_id: "happy".into(),
                operator: LogicOperator::Equals,
                value: json!(true),
            }],
            condition_type: ConditionType::And,
            action: LogicAction::Hide,
        }];
        let s = schema(vec![reason]);

        assert!(validate_submission(&s, &data(json!({ "happy": true }))).is_empty());
        assert_eq!(validate_submission(&s, &data(json!({ "happy": false }))).len(), 1);
    }

    #[test]
    fn length_pattern_and_range_checks() {
        let mut zip = FormField::new("zip", FieldType::Text);
        zip.min_length = Some(5);
        zip.max_length = Some(5);
        zip.pattern = Some(r"^\d+$".into());
        zip.pattern_error = Some("Digits only".into());
        let mut age = FormField::new("age", FieldType::Number);
        age.min = Some(18.0);
        age.max = Some(120.0);
        let s = schema(vec![zip, age]);

        let errors = validate_submission(&s, &data(json!({ "zip": "12a", "age": "17" })));
        let kinds: Vec<_> = errors.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![FieldErrorKind::TooShort, FieldErrorKind::Pattern, FieldErrorKind::BelowMinimum]
        );
        assert_eq!(errors[1].message, "Digits only");

        assert!(validate_submission(&s, &data(json!({ "zip": "12345", "age": 30 }))).is_empty());
        let over = validate_submission(&s, &data(json!({ "age": 121 })));
        assert_eq!(over[0].kind, FieldErrorKind::AboveMaximum);
    }

    #[test]
    fn invalid_author_pattern_is_ignored() {
        let mut f = FormField::new("f", FieldType::Text);
        f.pattern = Some("(unclosed".into());
        assert!(validate_submission(&schema(vec![f]), &data(json!({ "f": "anything" }))).is_empty());
    }
}
