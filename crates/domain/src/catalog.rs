//! Catalog taxonomy: categories, sub-categories and brands.
//!
//! Every entry carries bilingual display names. A sub-category may belong to
//! several categories; products reference at most one entry of each kind.

use common::{BrandId, CategoryId, SubCategoryId};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, require_text};

const NAME_MAX: usize = 50;

/// Validated display names of a taxonomy entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogNames {
    pub name: String,
    pub name_ar: String,
}

/// Display names as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogNamesInput {
    pub name: String,
    pub name_ar: String,
}

impl CatalogNamesInput {
    pub fn validate(self) -> Result<CatalogNames, ValidationError> {
        require_text("name", &self.name, Some(NAME_MAX))?;
        require_text("name_ar", &self.name_ar, Some(NAME_MAX))?;
        Ok(CatalogNames {
            name: self.name,
            name_ar: self.name_ar,
        })
    }
}

/// Partial names update. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogNamesPatch {
    pub name: Option<String>,
    pub name_ar: Option<String>,
}

impl CatalogNamesPatch {
    /// Merges the patch onto `current` and validates the result.
    pub fn apply(&self, current: &CatalogNames) -> Result<CatalogNames, ValidationError> {
        CatalogNamesInput {
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            name_ar: self.name_ar.clone().unwrap_or_else(|| current.name_ar.clone()),
        }
        .validate()
    }
}

impl From<CatalogNamesInput> for CatalogNamesPatch {
    fn from(input: CatalogNamesInput) -> Self {
        Self {
            name: Some(input.name),
            name_ar: Some(input.name_ar),
        }
    }
}

/// A top-level product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    #[serde(flatten)]
    pub names: CatalogNames,
}

impl Category {
    pub fn new(id: CategoryId, names: CatalogNames) -> Self {
        Self { id, names }
    }
}

/// A product brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Brand {
    pub id: BrandId,
    #[serde(flatten)]
    pub names: CatalogNames,
}

impl Brand {
    pub fn new(id: BrandId, names: CatalogNames) -> Self {
        Self { id, names }
    }
}

/// A sub-category, linked to any number of categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubCategory {
    pub id: SubCategoryId,
    #[serde(flatten)]
    pub names: CatalogNames,
    /// Linked categories in ascending id order.
    pub categories: Vec<CategoryId>,
}

impl SubCategory {
    pub fn new(id: SubCategoryId, fields: NewSubCategory) -> Self {
        Self {
            id,
            names: fields.names,
            categories: fields.categories,
        }
    }
}

/// Validated writable fields of a sub-category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubCategory {
    pub names: CatalogNames,
    pub categories: Vec<CategoryId>,
}

/// Sub-category as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct SubCategoryInput {
    #[serde(flatten)]
    pub names: CatalogNamesInput,
    #[serde(default)]
    pub categories: Vec<CategoryId>,
}

impl SubCategoryInput {
    pub fn validate(self) -> Result<NewSubCategory, ValidationError> {
        Ok(NewSubCategory {
            names: self.names.validate()?,
            categories: category_set(self.categories),
        })
    }
}

/// Partial sub-category update. A present `categories` replaces the links.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubCategoryPatch {
    #[serde(flatten)]
    pub names: CatalogNamesPatch,
    pub categories: Option<Vec<CategoryId>>,
}

impl SubCategoryPatch {
    /// Merges the patch onto `current` and validates the result.
    pub fn apply(&self, current: &SubCategory) -> Result<NewSubCategory, ValidationError> {
        Ok(NewSubCategory {
            names: self.names.apply(&current.names)?,
            categories: match &self.categories {
                Some(categories) => category_set(categories.clone()),
                None => current.categories.clone(),
            },
        })
    }
}

impl From<SubCategoryInput> for SubCategoryPatch {
    fn from(input: SubCategoryInput) -> Self {
        Self {
            names: input.names.into(),
            categories: Some(input.categories),
        }
    }
}

fn category_set(mut categories: Vec<CategoryId>) -> Vec<CategoryId> {
    categories.sort();
    categories.dedup();
    categories
}
