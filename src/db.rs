use async_trait::async_trait;
use rusqlite::{ffi, params, Connection, ErrorCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::error::{EtlError, Result};
use crate::storage::{InsertResult, RejectionKind, Sink, SinkRejection};
use crate::types::{Customer, Order, OrderItem, Product, Stage};

const SCHEMA_SQL: &str = include_str!("../migrations/001_create_fleximart_tables.sql");

/// Tables that may be counted through `SqliteSink::table_count`
pub const TABLES: [&str; 4] = ["customers", "products", "orders", "order_items"];

/// Relational sink backed by a single SQLite connection
pub struct SqliteSink {
    conn: Mutex<Connection>,
    /// Set between `begin` and `commit`/`rollback`
    in_unit: AtomicBool,
}

impl std::fmt::Debug for SqliteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSink")
            .field("conn", &"<Mutex<Connection>>")
            .field("in_unit", &self.in_unit.load(Ordering::SeqCst))
            .finish()
    }
}

impl SqliteSink {
    /// Open the database described by `config`, creating missing tables when
    /// `config.create_schema` is set
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Opening SQLite database at {}", config.path.display());
        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        let sink = Self::from_connection(conn)?;

        if config.create_schema {
            sink.ensure_schema()?;
        }
        Ok(sink)
    }

    /// Private in-memory database with the schema already applied
    pub fn open_in_memory() -> Result<Self> {
        let sink = Self::from_connection(Connection::open_in_memory()?)?;
        sink.ensure_schema()?;
        Ok(sink)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            in_unit: AtomicBool::new(false),
        })
    }

    /// Create the four tables if they do not exist yet
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!("Schema ready");
        Ok(())
    }

    /// Number of rows currently visible in one of `TABLES`
    pub fn table_count(&self, table: &str) -> Result<i64> {
        if !TABLES.contains(&table) {
            return Err(EtlError::Database {
                message: format!("unknown table '{table}'"),
            });
        }
        let conn = self.lock()?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| EtlError::Database {
            message: "connection mutex poisoned".to_string(),
        })
    }

    /// SQLite rolls an open transaction back by itself after some I/O errors
    /// (disk full, I/O failure). Later statements would then autocommit.
    fn unit_lost(&self, conn: &Connection) -> bool {
        self.in_unit.load(Ordering::SeqCst) && conn.is_autocommit()
    }

    /// Run one statement inside the open unit of work and return the last
    /// inserted row id
    fn insert<P: rusqlite::Params>(&self, sql: &str, params: P) -> InsertResult {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SinkRejection::new(RejectionKind::Unavailable, "connection mutex poisoned"))?;
        if self.unit_lost(&conn) {
            return Err(SinkRejection::new(
                RejectionKind::Unavailable,
                "unit of work was rolled back by the database",
            ));
        }
        if let Err(e) = conn.execute(sql, params) {
            let rejection = classify(e);
            if self.unit_lost(&conn) {
                error!("Database rolled back the open unit of work: {}", rejection);
            }
            return Err(rejection);
        }
        Ok(conn.last_insert_rowid())
    }
}

/// Map a failed statement onto a per-record rejection
fn classify(err: rusqlite::Error) -> SinkRejection {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            match e.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    RejectionKind::UniqueViolation
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => RejectionKind::ForeignKeyViolation,
                ffi::SQLITE_CONSTRAINT_NOTNULL => RejectionKind::NotNullViolation,
                ffi::SQLITE_CONSTRAINT_CHECK => RejectionKind::CheckViolation,
                _ => RejectionKind::Other,
            }
        }
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
            ) =>
        {
            RejectionKind::Unavailable
        }
        _ => RejectionKind::Other,
    };
    SinkRejection::new(kind, err.to_string())
}

#[async_trait]
impl Sink for SqliteSink {
    async fn begin(&self, stage: Stage) -> Result<()> {
        self.lock()?.execute_batch("BEGIN")?;
        self.in_unit.store(true, Ordering::SeqCst);
        debug!("Opened unit of work for {}", stage);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let conn = self.lock()?;
        if self.unit_lost(&conn) {
            self.in_unit.store(false, Ordering::SeqCst);
            return Err(EtlError::Database {
                message: "unit of work was rolled back by the database before commit".to_string(),
            });
        }
        conn.execute_batch("COMMIT")?;
        self.in_unit.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let conn = self.lock()?;
        self.in_unit.store(false, Ordering::SeqCst);
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    async fn insert_customer(&self, customer: &Customer) -> InsertResult {
        self.insert(
            "INSERT INTO customers (first_name, last_name, email, phone, city, registration_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                customer.first_name,
                customer.last_name,
                customer.email,
                customer.phone,
                customer.city,
                customer.registration_date,
            ],
        )
    }

    async fn insert_product(&self, product: &Product) -> InsertResult {
        self.insert(
            "INSERT INTO products (product_name, category, price, stock_quantity)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                product.product_name,
                product.category,
                product.price.to_string(),
                product.stock_quantity,
            ],
        )
    }

    async fn insert_order(&self, order: &Order) -> InsertResult {
        self.insert(
            "INSERT INTO orders (customer_id, order_date, total_amount, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                order.customer_id.0,
                order.order_date,
                order.total_amount.to_string(),
                order.status,
            ],
        )
    }

    async fn insert_order_item(&self, item: &OrderItem) -> InsertResult {
        self.insert(
            "INSERT INTO order_items (order_id, product_id, quantity, unit_price, subtotal)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.order_id,
                item.product_id.0,
                item.quantity,
                item.unit_price.to_string(),
                item.subtotal.to_string(),
            ],
        )
    }

    async fn retract_order(&self, order_id: i64) -> std::result::Result<(), SinkRejection> {
        self.insert("DELETE FROM orders WHERE id = ?1", params![order_id])?;
        Ok(())
    }
}
