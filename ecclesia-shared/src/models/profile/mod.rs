/// One-to-many profile sections: employment, leadership, ministry, family
///
/// Each section supports single-row add/update/delete (owner-checked by
/// `user_id`) and a `replace_all` bulk save used by the section forms.
/// `replace_all` validates every row before touching the database and then
/// swaps the section inside one transaction.
///
/// Employment and leadership forms must keep at least one row; rows flagged
/// current never carry an end date.

pub mod employment;
pub mod family;
pub mod leadership;
pub mod ministry;

pub use employment::{Employment, EmploymentInput};
pub use family::{FamilyMember, FamilyMemberInput};
pub use leadership::{LeadershipInput, LeadershipRole};
pub use ministry::{MinistryInput, MinistryMembership};

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by profile section operations
#[derive(Debug, Error)]
pub enum ProfileError {
    /// A field failed validation; `row` is the 1-based form row when known
    #[error("{message}")]
    Validation {
        field: &'static str,
        row: Option<usize>,
        message: String,
    },

    #[error("At least one {0} entry is required")]
    EmptySection(&'static str),

    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ProfileError {
    fn invalid(field: &'static str, row: Option<usize>, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = match row {
            Some(n) => format!("Row {}: {}", n, message),
            None => message,
        };
        ProfileError::Validation {
            field,
            row,
            message,
        }
    }
}

/// Trims a required text field, rejecting blanks and overlong values
pub(crate) fn required_text(
    value: &str,
    field: &'static str,
    max_len: usize,
    row: Option<usize>,
) -> Result<String, ProfileError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProfileError::invalid(field, row, format!("{} is required", label(field))));
    }
    if trimmed.chars().count() > max_len {
        return Err(ProfileError::invalid(
            field,
            row,
            format!("{} must be at most {} characters", label(field), max_len),
        ));
    }
    Ok(trimmed.to_string())
}

/// Trims an optional text field to None when blank
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolves the stored end date of a dated row
///
/// A current row never stores an end date. Otherwise the end date must not
/// precede the start date.
pub(crate) fn period_end(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    is_current: bool,
    row: Option<usize>,
) -> Result<Option<NaiveDate>, ProfileError> {
    if is_current {
        return Ok(None);
    }
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(ProfileError::invalid(
                "end_date",
                row,
                "End date cannot be before start date",
            ));
        }
    }
    Ok(end)
}

fn label(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_current_row_drops_end_date() {
        let end = period_end(date(2020, 1, 1), date(2021, 1, 1), true, None).unwrap();
        assert_eq!(end, None);
    }

    #[test]
    fn test_end_before_start_rejected() {
        let err = period_end(date(2022, 5, 1), date(2021, 1, 1), false, Some(2)).unwrap_err();
        match err {
            ProfileError::Validation { field, row, message } => {
                assert_eq!(field, "end_date");
                assert_eq!(row, Some(2));
                assert!(message.starts_with("Row 2:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_open_ended_period_allowed() {
        assert_eq!(period_end(date(2022, 5, 1), None, false, None).unwrap(), None);
        assert_eq!(period_end(None, date(2021, 1, 1), false, None).unwrap(), date(2021, 1, 1));
    }

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("  Shell ", "employer", 10, None).unwrap(), "Shell");
        assert!(matches!(
            required_text("   ", "employer", 10, None),
            Err(ProfileError::Validation { field: "employer", .. })
        ));
        assert!(required_text("abcdefghijk", "employer", 10, None).is_err());
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text(Some("  ".to_string())), None);
        assert_eq!(optional_text(Some(" Choir ".to_string())).as_deref(), Some("Choir"));
        assert_eq!(optional_text(None), None);
    }

    #[test]
    fn test_label() {
        assert_eq!(label("full_name"), "Full name");
    }
}
