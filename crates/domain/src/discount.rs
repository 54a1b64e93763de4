//! Time-limited product discounts.

use chrono::NaiveDate;
use common::{DiscountId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A percentage discount on one product, active until `finish_date`.
///
/// At most one discount exists per (product, finish date, percentage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discount {
    pub id: DiscountId,
    pub product_id: ProductId,
    pub finish_date: NaiveDate,
    pub percentage: u8,
}

impl Discount {
    pub fn new(id: DiscountId, fields: NewDiscount) -> Self {
        Self {
            id,
            product_id: fields.product_id,
            finish_date: fields.finish_date,
            percentage: fields.percentage,
        }
    }

    /// The discount applies on every day before its finish date.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.finish_date > today
    }

    /// The writable fields of this discount.
    pub fn fields(&self) -> NewDiscount {
        NewDiscount {
            product_id: self.product_id,
            finish_date: self.finish_date,
            percentage: self.percentage,
        }
    }
}

/// Validated writable fields of a discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewDiscount {
    pub product_id: ProductId,
    pub finish_date: NaiveDate,
    pub percentage: u8,
}

/// Discount as submitted by a client.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DiscountInput {
    pub product_id: ProductId,
    pub finish_date: NaiveDate,
    pub percentage: u16,
}

impl DiscountInput {
    pub fn validate(self) -> Result<NewDiscount, ValidationError> {
        Ok(NewDiscount {
            product_id: self.product_id,
            finish_date: self.finish_date,
            percentage: validate_percentage(self.percentage)?,
        })
    }
}

/// Partial discount update. Absent fields keep their value.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DiscountPatch {
    pub product_id: Option<ProductId>,
    pub finish_date: Option<NaiveDate>,
    pub percentage: Option<u16>,
}

impl DiscountPatch {
    /// Merges the patch onto `current` and validates the result.
    pub fn apply(&self, current: &Discount) -> Result<NewDiscount, ValidationError> {
        let mut merged = current.fields();
        if let Some(product_id) = self.product_id {
            merged.product_id = product_id;
        }
        if let Some(finish_date) = self.finish_date {
            merged.finish_date = finish_date;
        }
        if let Some(percentage) = self.percentage {
            merged.percentage = validate_percentage(percentage)?;
        }
        Ok(merged)
    }
}

impl From<DiscountInput> for DiscountPatch {
    fn from(input: DiscountInput) -> Self {
        Self {
            product_id: Some(input.product_id),
            finish_date: Some(input.finish_date),
            percentage: Some(input.percentage),
        }
    }
}

fn validate_percentage(percentage: u16) -> Result<u8, ValidationError> {
    match u8::try_from(percentage) {
        Ok(value @ 1..=100) => Ok(value),
        _ => Err(ValidationError::new(
            "percentage",
            "must be between 1 and 100",
        )),
    }
}
