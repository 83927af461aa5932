//! Idempotent schema setup for both databases
//!
//! MySQL owns the transactional tables (users, products, orders, notes with
//! JSON text tags); PostgreSQL owns analytics, metrics and notes with native
//! arrays. PostgreSQL also carries a slim `users` mirror, kept current by the
//! user routes, so the notes LEFT JOIN works in either engine. PostgreSQL
//! notes reference users without a foreign key: MySQL is the authority.

use sqlx::{MySqlPool, PgPool};

const PG_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username VARCHAR(50) NOT NULL UNIQUE,
        email VARCHAR(255) NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notes (
        id VARCHAR(64) PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        tags TEXT[] NOT NULL DEFAULT '{}',
        is_public BOOLEAN NOT NULL DEFAULT FALSE,
        user_id BIGINT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    // schemas created before the mirror carried a foreign key
    "ALTER TABLE notes DROP CONSTRAINT IF EXISTS notes_user_id_fkey",
    "CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_notes_tags ON notes USING GIN (tags)",
    r#"
    CREATE TABLE IF NOT EXISTS analytics_events (
        id BIGSERIAL PRIMARY KEY,
        session_id VARCHAR(100) NOT NULL,
        user_id BIGINT,
        event_type VARCHAR(50) NOT NULL,
        event_name VARCHAR(100),
        page_url TEXT,
        device_type VARCHAR(100),
        browser VARCHAR(100),
        operating_system VARCHAR(100),
        country VARCHAR(100),
        city VARCHAR(100),
        event_data JSONB NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_events_created_at ON analytics_events (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_events_type ON analytics_events (event_type, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS performance_metrics (
        id BIGSERIAL PRIMARY KEY,
        metric_name VARCHAR(100) NOT NULL,
        metric_type VARCHAR(20) NOT NULL DEFAULT 'gauge',
        value DOUBLE PRECISION NOT NULL,
        unit VARCHAR(50),
        source VARCHAR(20) NOT NULL DEFAULT 'application',
        tags JSONB NOT NULL DEFAULT '{}',
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_metrics_name_time ON performance_metrics (metric_name, recorded_at DESC)",
];

const MYSQL_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        username VARCHAR(50) NOT NULL UNIQUE,
        email VARCHAR(255) NOT NULL UNIQUE,
        first_name VARCHAR(100),
        last_name VARCHAR(100),
        status VARCHAR(20) NOT NULL DEFAULT 'active',
        is_active TINYINT(1) NOT NULL DEFAULT 1,
        created_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        updated_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        deleted_at DATETIME(3) NULL,
        INDEX idx_users_deleted (deleted_at)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        description TEXT,
        category VARCHAR(100),
        price DECIMAL(12, 2) NOT NULL DEFAULT 0,
        stock_quantity INT NOT NULL DEFAULT 0,
        is_active TINYINT(1) NOT NULL DEFAULT 1,
        created_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        updated_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        INDEX idx_products_category (category)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        user_id BIGINT NOT NULL,
        order_number VARCHAR(32) NOT NULL UNIQUE,
        status VARCHAR(20) NOT NULL DEFAULT 'pending',
        total_amount DECIMAL(12, 2) NOT NULL DEFAULT 0,
        payment_method VARCHAR(50),
        payment_status VARCHAR(20) NOT NULL DEFAULT 'pending',
        order_date DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        created_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        updated_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        INDEX idx_orders_user (user_id),
        INDEX idx_orders_date (order_date),
        CONSTRAINT fk_orders_user FOREIGN KEY (user_id) REFERENCES users(id)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        order_id BIGINT NOT NULL,
        product_id BIGINT NOT NULL,
        quantity INT NOT NULL,
        unit_price DECIMAL(12, 2) NOT NULL,
        CONSTRAINT fk_items_order FOREIGN KEY (order_id) REFERENCES orders(id) ON DELETE CASCADE,
        CONSTRAINT fk_items_product FOREIGN KEY (product_id) REFERENCES products(id)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notes (
        id VARCHAR(64) PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        content MEDIUMTEXT NOT NULL,
        tags TEXT,
        is_public TINYINT(1) NOT NULL DEFAULT 0,
        user_id BIGINT NULL,
        created_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        updated_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        INDEX idx_notes_created (created_at),
        CONSTRAINT fk_notes_user FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
    "#,
];

/// Run all PostgreSQL migrations
pub async fn run_pg(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running PostgreSQL migrations...");
    for statement in PG_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!(statements = PG_STATEMENTS.len(), "PostgreSQL migrations complete");
    Ok(())
}

/// Run all MySQL migrations
pub async fn run_mysql(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running MySQL migrations...");
    for statement in MYSQL_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!(statements = MYSQL_STATEMENTS.len(), "MySQL migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_are_idempotent() {
        for statement in PG_STATEMENTS.iter().chain(MYSQL_STATEMENTS) {
            assert!(
                statement.contains("IF NOT EXISTS") || statement.contains("IF EXISTS"),
                "non-idempotent migration: {}",
                statement.trim()
            );
        }
    }

    #[test]
    fn notes_tag_encodings_differ_per_engine() {
        let pg_notes = PG_STATEMENTS.iter().find(|s| s.contains("TABLE IF NOT EXISTS notes")).unwrap();
        let my_notes = MYSQL_STATEMENTS.iter().find(|s| s.contains("TABLE IF NOT EXISTS notes")).unwrap();
        assert!(pg_notes.contains("tags TEXT[]"));
        assert!(my_notes.contains("tags TEXT,"));
    }

    #[test]
    fn pg_notes_do_not_require_mirrored_users() {
        let pg_notes = PG_STATEMENTS.iter().find(|s| s.contains("TABLE IF NOT EXISTS notes")).unwrap();
        assert!(!pg_notes.contains("REFERENCES"));
        assert!(PG_STATEMENTS.iter().any(|s| s.contains("DROP CONSTRAINT IF EXISTS notes_user_id_fkey")));
    }
}
