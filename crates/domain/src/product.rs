//! Catalog products.

use chrono::{DateTime, Utc};
use common::{BrandId, CategoryId, ProductId, SubCategoryId};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ValidationError, check_length, require_text};
use crate::money::Money;
use crate::string_set::{StringSet, TokenRule};

const NAME_MAX: usize = 50;
const SKU_MAX: usize = 40;

/// A catalog product with its current stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub name_ar: String,
    pub description: String,
    pub description_ar: String,
    pub colors: StringSet,
    pub colors_ar: StringSet,
    pub sizes: StringSet,
    #[serde(rename = "price_cents")]
    pub price: Money,
    pub quantity: u32,
    pub sku: String,
    pub brand: Option<BrandId>,
    pub category: Option<CategoryId>,
    pub sub_category: Option<SubCategoryId>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Builds a product record from validated fields.
    pub fn new(id: ProductId, fields: NewProduct, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: fields.name,
            name_ar: fields.name_ar,
            description: fields.description,
            description_ar: fields.description_ar,
            colors: fields.colors,
            colors_ar: fields.colors_ar,
            sizes: fields.sizes,
            price: fields.price,
            quantity: fields.quantity,
            sku: fields.sku,
            brand: fields.brand,
            category: fields.category,
            sub_category: fields.sub_category,
            created_at,
        }
    }

    /// Returns true if the product is offered in `color`.
    pub fn has_color(&self, color: &str) -> bool {
        self.colors.contains(color)
    }

    /// Returns true if the product is offered in `size`.
    pub fn has_size(&self, size: u32) -> bool {
        self.sizes.contains(&size.to_string())
    }

    /// The writable fields of this product.
    pub fn fields(&self) -> NewProduct {
        NewProduct {
            name: self.name.clone(),
            name_ar: self.name_ar.clone(),
            description: self.description.clone(),
            description_ar: self.description_ar.clone(),
            colors: self.colors.clone(),
            colors_ar: self.colors_ar.clone(),
            sizes: self.sizes.clone(),
            price: self.price,
            quantity: self.quantity,
            sku: self.sku.clone(),
            brand: self.brand,
            category: self.category,
            sub_category: self.sub_category,
        }
    }
}

/// Validated writable fields of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub name_ar: String,
    pub description: String,
    pub description_ar: String,
    pub colors: StringSet,
    pub colors_ar: StringSet,
    pub sizes: StringSet,
    pub price: Money,
    pub quantity: u32,
    pub sku: String,
    pub brand: Option<BrandId>,
    pub category: Option<CategoryId>,
    pub sub_category: Option<SubCategoryId>,
}

/// Unvalidated product fields as submitted by a client.
///
/// Sets are given in their comma-joined form (`"red,blue"`). Taxonomy
/// references are optional; their existence is checked by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub name_ar: String,
    pub description: String,
    pub description_ar: String,
    pub colors: String,
    pub colors_ar: String,
    pub sizes: String,
    pub price_cents: i64,
    pub quantity: u32,
    pub sku: String,
    #[serde(default)]
    pub brand: Option<BrandId>,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub sub_category: Option<SubCategoryId>,
}

impl ProductInput {
    /// Validates every field.
    pub fn validate(self) -> Result<NewProduct, ValidationError> {
        require_text("name", &self.name, Some(NAME_MAX))?;
        require_text("name_ar", &self.name_ar, Some(NAME_MAX))?;
        require_text("description", &self.description, None)?;
        require_text("description_ar", &self.description_ar, None)?;
        require_text("sku", &self.sku, Some(SKU_MAX))?;
        let price = validate_price(self.price_cents)?;

        Ok(NewProduct {
            colors: StringSet::parse("colors", &self.colors, TokenRule::Word)?,
            colors_ar: StringSet::parse("colors_ar", &self.colors_ar, TokenRule::Arabic)?,
            sizes: StringSet::parse("sizes", &self.sizes, TokenRule::Digits)?,
            name: self.name,
            name_ar: self.name_ar,
            description: self.description,
            description_ar: self.description_ar,
            price,
            quantity: self.quantity,
            sku: self.sku,
            brand: self.brand,
            category: self.category,
            sub_category: self.sub_category,
        })
    }
}

/// Partial product update. Absent fields keep their current value; an
/// explicit `null` taxonomy reference clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub name_ar: Option<String>,
    pub description: Option<String>,
    pub description_ar: Option<String>,
    pub colors: Option<String>,
    pub colors_ar: Option<String>,
    pub sizes: Option<String>,
    pub price_cents: Option<i64>,
    pub quantity: Option<u32>,
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub brand: Option<Option<BrandId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<CategoryId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub sub_category: Option<Option<SubCategoryId>>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ProductPatch {
    /// Merges the patch onto `current` and validates the result.
    pub fn apply(&self, current: &Product) -> Result<NewProduct, ValidationError> {
        let current = current.fields();
        let mut merged = NewProduct {
            name: self.name.clone().unwrap_or(current.name),
            name_ar: self.name_ar.clone().unwrap_or(current.name_ar),
            description: self.description.clone().unwrap_or(current.description),
            description_ar: self.description_ar.clone().unwrap_or(current.description_ar),
            colors: current.colors,
            colors_ar: current.colors_ar,
            sizes: current.sizes,
            price: current.price,
            quantity: self.quantity.unwrap_or(current.quantity),
            sku: self.sku.clone().unwrap_or(current.sku),
            brand: self.brand.unwrap_or(current.brand),
            category: self.category.unwrap_or(current.category),
            sub_category: self.sub_category.unwrap_or(current.sub_category),
        };

        require_text("name", &merged.name, Some(NAME_MAX))?;
        require_text("name_ar", &merged.name_ar, Some(NAME_MAX))?;
        require_text("description", &merged.description, None)?;
        require_text("description_ar", &merged.description_ar, None)?;
        require_text("sku", &merged.sku, Some(SKU_MAX))?;

        if let Some(colors) = &self.colors {
            merged.colors = StringSet::parse("colors", colors, TokenRule::Word)?;
        }
        if let Some(colors_ar) = &self.colors_ar {
            merged.colors_ar = StringSet::parse("colors_ar", colors_ar, TokenRule::Arabic)?;
        }
        if let Some(sizes) = &self.sizes {
            merged.sizes = StringSet::parse("sizes", sizes, TokenRule::Digits)?;
        }
        if let Some(cents) = self.price_cents {
            merged.price = validate_price(cents)?;
        }

        Ok(merged)
    }
}

impl From<ProductInput> for ProductPatch {
    fn from(input: ProductInput) -> Self {
        Self {
            name: Some(input.name),
            name_ar: Some(input.name_ar),
            description: Some(input.description),
            description_ar: Some(input.description_ar),
            colors: Some(input.colors),
            colors_ar: Some(input.colors_ar),
            sizes: Some(input.sizes),
            price_cents: Some(input.price_cents),
            quantity: Some(input.quantity),
            sku: Some(input.sku),
            brand: Some(input.brand),
            category: Some(input.category),
            sub_category: Some(input.sub_category),
        }
    }
}

fn validate_price(cents: i64) -> Result<Money, ValidationError> {
    let price = Money::from_cents(cents);
    if price.is_negative() {
        return Err(ValidationError::new("price_cents", "must not be negative"));
    }
    Ok(price)
}

/// Catalog listing filters. All present filters must match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    /// Case-insensitive substring over names, descriptions and SKU.
    pub search: Option<String>,
    /// Substring of the comma-joined colors text.
    pub color: Option<String>,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub quantity_min: Option<u32>,
    pub quantity_max: Option<u32>,
    pub brand: Option<BrandId>,
    pub category: Option<CategoryId>,
    pub sub_category: Option<SubCategoryId>,
}

impl ProductFilter {
    /// Returns true if `product` satisfies every present filter.
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            let hit = [
                &product.name,
                &product.name_ar,
                &product.description,
                &product.description_ar,
                &product.sku,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        if let Some(color) = &self.color
            && !product.colors.to_joined().contains(color.as_str())
        {
            return false;
        }
        let price = product.price.cents();
        if self.price_min.is_some_and(|min| price < min) {
            return false;
        }
        if self.price_max.is_some_and(|max| price > max) {
            return false;
        }
        if self.quantity_min.is_some_and(|min| product.quantity < min) {
            return false;
        }
        if self.quantity_max.is_some_and(|max| product.quantity > max) {
            return false;
        }
        if self.brand.is_some() && product.brand != self.brand {
            return false;
        }
        if self.category.is_some() && product.category != self.category {
            return false;
        }
        if self.sub_category.is_some() && product.sub_category != self.sub_category {
            return false;
        }
        true
    }
}
