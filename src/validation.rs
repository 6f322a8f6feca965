// Validation failures shared by controller constants and reflow profiles
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{lower} must not exceed {upper}")]
    NotMonotonic {
        lower: &'static str,
        upper: &'static str,
    },
    #[error("total runtime {total}s is below the minimum of {min}s")]
    RuntimeTooShort { total: i64, min: i64 },
    #[error("profile name is invalid: {0}")]
    InvalidName(String),
}

/// Check that `value` is finite and inside `[min, max]`.
pub(crate) fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange { field, value, min, max });
    }
    Ok(())
}
