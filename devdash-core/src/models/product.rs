//! Product catalogue (MySQL)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{optional_text, required_text};
use super::{Pagination, ValidationError};

const MAX_NAME_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 5_000;
const MAX_CATEGORY_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub stock_quantity: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub stock_quantity: i32,
    pub is_active: bool,
}

fn validate_price(price: f64) -> Result<f64, ValidationError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ValidationError::OutOfRange {
            field: "price",
            reason: "must be a non-negative number",
        });
    }
    Ok(price)
}

fn validate_stock(stock: i32) -> Result<i32, ValidationError> {
    if stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "stock_quantity",
            reason: "cannot be negative",
        });
    }
    Ok(stock)
}

impl CreateProductRequest {
    pub fn validate(self) -> Result<NewProduct, ValidationError> {
        Ok(NewProduct {
            name: required_text("name", &self.name, MAX_NAME_LEN)?,
            description: optional_text("description", self.description.as_deref(), MAX_DESCRIPTION_LEN)?,
            category: optional_text("category", self.category.as_deref(), MAX_CATEGORY_LEN)?,
            price: validate_price(self.price)?,
            stock_quantity: validate_stock(self.stock_quantity.unwrap_or(0))?,
            is_active: self.is_active.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub stock_quantity: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub stock_quantity: Option<i32>,
    pub is_active: Option<bool>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.price.is_none()
            && self.stock_quantity.is_none()
            && self.is_active.is_none()
    }
}

impl UpdateProductRequest {
    pub fn validate(self) -> Result<ProductPatch, ValidationError> {
        Ok(ProductPatch {
            name: self
                .name
                .map(|n| required_text("name", &n, MAX_NAME_LEN))
                .transpose()?,
            description: optional_text("description", self.description.as_deref(), MAX_DESCRIPTION_LEN)?,
            category: optional_text("category", self.category.as_deref(), MAX_CATEGORY_LEN)?,
            price: self.price.map(validate_price).transpose()?,
            stock_quantity: self.stock_quantity.map(validate_stock).transpose()?,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub active: Option<bool>,
}

impl ProductQuery {
    pub fn into_parts(self) -> Result<(ProductFilter, Pagination), ValidationError> {
        let min_price = self.min_price.map(validate_price).transpose()?;
        let max_price = self.max_price.map(validate_price).transpose()?;
        if let (Some(min), Some(max)) = (min_price, max_price) {
            if min > max {
                return Err(ValidationError::OutOfRange {
                    field: "min_price",
                    reason: "must not exceed max_price",
                });
            }
        }
        let filter = ProductFilter {
            category: optional_text("category", self.category.as_deref(), MAX_CATEGORY_LEN)?,
            search: optional_text("search", self.search.as_deref(), MAX_NAME_LEN)?,
            min_price,
            max_price,
            active: self.active,
        };
        Ok((filter, Pagination::from_options(self.page, self.limit)))
    }
}
