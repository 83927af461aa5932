//! Product repository (MySQL)

use devdash_core::models::{NewProduct, Paginated, Pagination, Product, ProductFilter, ProductPatch};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};

use super::DbError;
use crate::db::like_pattern;

// DECIMAL is cast so it decodes straight into f64
const PRODUCT_COLUMNS: &str = "id, name, description, category, CAST(price AS DOUBLE) AS price, \
                               stock_quantity, is_active, created_at, updated_at";

/// Product repository
pub struct ProductRepo<'a> {
    pool: &'a MySqlPool,
}

impl<'a> ProductRepo<'a> {
    pub fn new(pool: &'a MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &ProductFilter, page: Pagination) -> Result<Paginated<Product>, DbError> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM products WHERE 1=1");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<MySql>::new(format!("SELECT {} FROM products WHERE 1=1", PRODUCT_COLUMNS));
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = select.build().fetch_all(self.pool).await?;
        let items = rows.iter().map(product_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated::new(items, total, page))
    }

    pub async fn get(&self, id: i64) -> Result<Product, DbError> {
        let row = sqlx::query(&format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("product", id))?;

        Ok(product_from_row(&row)?)
    }

    pub async fn create(&self, product: NewProduct) -> Result<Product, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO products (name, description, category, price, stock_quantity, is_active)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.price)
        .bind(product.stock_quantity)
        .bind(product.is_active)
        .execute(self.pool)
        .await
        .map_err(|e| DbError::from_write(e, "product", "product_id"))?;

        self.get(result.last_insert_id() as i64).await
    }

    pub async fn update(&self, id: i64, patch: &ProductPatch) -> Result<Product, DbError> {
        if patch.is_empty() {
            return self.get(id).await;
        }

        let mut query = QueryBuilder::<MySql>::new("UPDATE products SET updated_at = CURRENT_TIMESTAMP(3)");
        if let Some(ref name) = patch.name {
            query.push(", name = ").push_bind(name.clone());
        }
        if let Some(ref description) = patch.description {
            query.push(", description = ").push_bind(description.clone());
        }
        if let Some(ref category) = patch.category {
            query.push(", category = ").push_bind(category.clone());
        }
        if let Some(price) = patch.price {
            query.push(", price = ").push_bind(price);
        }
        if let Some(stock) = patch.stock_quantity {
            query.push(", stock_quantity = ").push_bind(stock);
        }
        if let Some(is_active) = patch.is_active {
            query.push(", is_active = ").push_bind(is_active);
        }
        query.push(" WHERE id = ").push_bind(id);

        query.build().execute(self.pool).await?;
        self.get(id).await
    }

    /// Hard delete. Products referenced by order items cannot be removed.
    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| match DbError::from_write(e, "product", "product_id") {
                DbError::Validation(_) => {
                    DbError::Conflict(format!("product {} is referenced by existing orders", id))
                }
                other => other,
            })?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("product", id));
        }
        Ok(())
    }

    /// Random sample of live ids, used by the data generator.
    pub async fn sample_ids(&self, limit: i64) -> Result<Vec<i64>, DbError> {
        let ids = sqlx::query_scalar("SELECT id FROM products WHERE is_active = 1 ORDER BY RAND() LIMIT ?")
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        Ok(ids)
    }
}

fn push_filters(query: &mut QueryBuilder<'_, MySql>, filter: &ProductFilter) {
    if let Some(ref category) = filter.category {
        query.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(ref search) = filter.search {
        let pattern = like_pattern(search);
        query
            .push(" AND (name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR description LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(min) = filter.min_price {
        query.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        query.push(" AND price <= ").push_bind(max);
    }
    if let Some(active) = filter.active {
        query.push(" AND is_active = ").push_bind(active);
    }
}

fn product_from_row(r: &MySqlRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        description: r.try_get("description")?,
        category: r.try_get("category")?,
        price: r.try_get("price")?,
        stock_quantity: r.try_get("stock_quantity")?,
        is_active: r.try_get("is_active")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}
