//! # Validation Module
//!
//! Input validation for records entering the system.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Presentation (CLI args / UI form)                            │
//! │  ├── Type parsing (amount is a number, category is known)              │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: RecordsFacade::create_record                                 │
//! │  └── THIS MODULE: rejects malformed payloads                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Sync Engine                                                  │
//! │  └── Assumes valid input, never re-validates                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_amount, validate_merchant};
//!
//! assert!(validate_merchant("Whole Foods").is_ok());
//! assert!(validate_amount(0.0).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::NewRecord;
use crate::MAX_MERCHANT_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a merchant name.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_MERCHANT_LENGTH`] characters
pub fn validate_merchant(merchant: &str) -> ValidationResult<()> {
    let merchant = merchant.trim();

    if merchant.is_empty() {
        return Err(ValidationError::Required {
            field: "merchant".to_string(),
        });
    }

    if merchant.chars().count() > MAX_MERCHANT_LENGTH {
        return Err(ValidationError::TooLong {
            field: "merchant".to_string(),
            max: MAX_MERCHANT_LENGTH,
        });
    }

    Ok(())
}

/// Validates a record amount.
///
/// ## Rules
/// - Must be a finite number
/// - Must be strictly greater than zero
pub fn validate_amount(amount: f64) -> ValidationResult<()> {
    if !amount.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: "must be a finite number".to_string(),
        });
    }

    if amount <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a full payload before it is handed to the sync engine.
pub fn validate_new_record(record: &NewRecord) -> ValidationResult<()> {
    validate_merchant(&record.merchant)?;
    validate_amount(record.amount)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    #[test]
    fn test_validate_merchant() {
        assert!(validate_merchant("Whole Foods").is_ok());
        assert!(validate_merchant("A").is_ok());

        assert!(validate_merchant("").is_err());
        assert!(validate_merchant("   ").is_err());
        assert!(validate_merchant(&"A".repeat(MAX_MERCHANT_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(0.01).is_ok());
        assert!(validate_amount(124.99).is_ok());

        assert_eq!(
            validate_amount(0.0),
            Err(ValidationError::MustBePositive {
                field: "amount".into()
            })
        );
        assert!(validate_amount(-5.0).is_err());
        assert!(validate_amount(f64::NAN).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_new_record() {
        let ok = NewRecord::new("Test Store", 50.0, Category::Food);
        assert!(validate_new_record(&ok).is_ok());

        let no_merchant = NewRecord::new("", 50.0, Category::Food);
        assert!(matches!(
            validate_new_record(&no_merchant),
            Err(ValidationError::Required { .. })
        ));

        let negative = NewRecord::new("Store", -1.0, Category::Other);
        assert!(matches!(
            validate_new_record(&negative),
            Err(ValidationError::MustBePositive { .. })
        ));
    }
}
