/// Field-level view of `validator` failures
///
/// Struct-level checks (`#[validate(schema(...))]`) land under the
/// `__all__` key; they are reported against the field named by the
/// error's code instead, so cross-field rules like "ends after it starts"
/// still point the form at a real input.

use std::borrow::Cow;
use validator::{ValidationError, ValidationErrors};

const STRUCT_LEVEL_KEY: &str = "__all__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Flattens validation errors, sorted by field name
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut details: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| {
                let field = if field == STRUCT_LEVEL_KEY {
                    e.code.to_string()
                } else {
                    field.clone()
                };
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field));
                FieldError { field, message }
            })
        })
        .collect();
    details.sort_by(|a, b| a.field.cmp(&b.field));
    details
}

/// Whether `field` is among the failures
pub fn has_field(errors: &ValidationErrors, field: &str) -> bool {
    field_errors(errors).iter().any(|e| e.field == field)
}

/// Error for a struct-level rule, reported against `field`
pub fn cross_field_error(field: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(field);
    error.message = Some(Cow::Borrowed(message));
    error
}
