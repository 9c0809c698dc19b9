//! # Validation Module
//!
//! Business-rule validation for Kirana POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI shell                                                     │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Business operations (Rust)                                   │
//! │  └── THIS MODULE: runs BEFORE the local transaction opens, so an       │
//! │      invalid cart never creates a bill, stock change or log entry      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE constraints                                     │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{BillItem, PaymentMode};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum items allowed in a single bill.
///
/// Prevents runaway carts and keeps receipt sizes reasonable.
pub const MAX_BILL_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
///
/// Prevents accidental over-entry (typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

// =============================================================================
// Cart / Checkout Validation
// =============================================================================

/// Validates a cart before checkout.
///
/// ## Rules
/// - Cart must not be empty and must not exceed [`MAX_BILL_ITEMS`]
/// - Every quantity must be in 1..=[`MAX_ITEM_QUANTITY`]
/// - Unit prices must not be negative
/// - Every line total must equal qty × price (the UI snapshots these
///   separately, so an inconsistent pair means a UI bug)
/// - Credit payment requires an attributed customer
pub fn validate_cart(
    items: &[BillItem],
    payment_mode: PaymentMode,
    has_customer: bool,
) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::EmptyCart);
    }

    if items.len() > MAX_BILL_ITEMS {
        return Err(ValidationError::CartTooLarge {
            max: MAX_BILL_ITEMS,
        });
    }

    for item in items {
        if item.qty <= 0 || item.qty > MAX_ITEM_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: format!("qty for {}", item.product_id),
                min: 1,
                max: MAX_ITEM_QUANTITY,
            });
        }

        if item.price_paise < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: format!("price for {}", item.product_id),
            });
        }

        let expected = item.qty * item.price_paise;
        if item.total_paise != expected {
            return Err(ValidationError::LineTotalMismatch {
                product_id: item.product_id.clone(),
                expected,
                got: item.total_paise,
            });
        }
    }

    if payment_mode == PaymentMode::Credit && !has_customer {
        return Err(ValidationError::CreditWithoutCustomer);
    }

    Ok(())
}

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a display name (product, customer): non-empty after trimming.
pub fn validate_name(name: &str) -> ValidationResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }
    Ok(())
}

/// Validates a price in paise: must not be negative.
pub fn validate_price(price_paise: i64) -> ValidationResult<()> {
    if price_paise < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }
    Ok(())
}

/// Validates a khata or expense amount: must be strictly positive.
/// Direction is carried by the entry type, never by the sign.
pub fn validate_amount(amount_paise: i64) -> ValidationResult<()> {
    if amount_paise <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    Ok(())
}

/// Validates a restock quantity: must be strictly positive.
pub fn validate_restock_qty(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "qty".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(qty: i64, price: i64) -> BillItem {
        BillItem {
            product_id: "prod-1".to_string(),
            name: "Toor Dal 1kg".to_string(),
            qty,
            price_paise: price,
            total_paise: qty * price,
        }
    }

    #[test]
    fn test_valid_cart() {
        let items = vec![item(2, 5000), item(1, 2500)];
        assert!(validate_cart(&items, PaymentMode::Cash, false).is_ok());
    }

    #[test]
    fn test_empty_cart_rejected() {
        assert!(matches!(
            validate_cart(&[], PaymentMode::Cash, false),
            Err(ValidationError::EmptyCart)
        ));
    }

    #[test]
    fn test_zero_qty_rejected() {
        let items = vec![item(0, 5000)];
        assert!(validate_cart(&items, PaymentMode::Cash, false).is_err());
    }

    #[test]
    fn test_line_total_mismatch_rejected() {
        let mut bad = item(2, 5000);
        bad.total_paise = 9999;
        assert!(matches!(
            validate_cart(&[bad], PaymentMode::Cash, false),
            Err(ValidationError::LineTotalMismatch { .. })
        ));
    }

    #[test]
    fn test_credit_requires_customer() {
        let items = vec![item(1, 5000)];
        assert!(matches!(
            validate_cart(&items, PaymentMode::Credit, false),
            Err(ValidationError::CreditWithoutCustomer)
        ));
        assert!(validate_cart(&items, PaymentMode::Credit, true).is_ok());
    }

    #[test]
    fn test_khata_amount_must_be_positive() {
        assert!(validate_amount(100).is_ok());
        assert!(validate_amount(0).is_err());
        assert!(validate_amount(-100).is_err());
    }
}
