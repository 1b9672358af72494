use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

use crate::error::{EtlError, Result};
use crate::types::{Customer, Order, OrderItem, Product, Stage};

/// Category of a per-record sink failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    UniqueViolation,
    ForeignKeyViolation,
    NotNullViolation,
    CheckViolation,
    /// The sink could not execute the statement at all
    Unavailable,
    Other,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RejectionKind::UniqueViolation => "unique constraint violated",
            RejectionKind::ForeignKeyViolation => "foreign key constraint violated",
            RejectionKind::NotNullViolation => "not-null constraint violated",
            RejectionKind::CheckViolation => "check constraint violated",
            RejectionKind::Unavailable => "sink unavailable",
            RejectionKind::Other => "insert failed",
        };
        f.write_str(label)
    }
}

/// A single insert the sink refused. Never aborts a stage.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct SinkRejection {
    pub kind: RejectionKind,
    pub message: String,
}

impl SinkRejection {
    pub fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub type InsertResult = std::result::Result<i64, SinkRejection>;

/// Transactional relational sink.
///
/// A stage opens one unit of work with `begin`, issues any number of inserts
/// (each of which may be rejected on its own without undoing the others), and
/// ends with a single `commit`. Only `begin`, `commit` and `rollback` fail the
/// stage.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn begin(&self, stage: Stage) -> Result<()>;
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;

    async fn insert_customer(&self, customer: &Customer) -> InsertResult;
    async fn insert_product(&self, product: &Product) -> InsertResult;
    /// Returns the sink-assigned order id
    async fn insert_order(&self, order: &Order) -> InsertResult;
    async fn insert_order_item(&self, item: &OrderItem) -> InsertResult;
    /// Remove an order inserted earlier in the open unit of work
    async fn retract_order(&self, order_id: i64) -> std::result::Result<(), SinkRejection>;
}

/// Rows of the four tables, keyed by primary key
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub customers: BTreeMap<i64, Customer>,
    pub products: BTreeMap<i64, Product>,
    pub orders: BTreeMap<i64, Order>,
    pub order_items: BTreeMap<i64, OrderItem>,
    next_id: [i64; 4],
}

impl Tables {
    fn allocate(&mut self, table: usize) -> i64 {
        self.next_id[table] += 1;
        self.next_id[table]
    }

    /// Add an already-committed customer without constraint checks
    pub fn seed_customer(&mut self, customer: Customer) -> i64 {
        let id = self.allocate(0);
        self.customers.insert(id, customer);
        id
    }

    pub fn seed_product(&mut self, product: Product) -> i64 {
        let id = self.allocate(1);
        self.products.insert(id, product);
        id
    }

    fn insert_customer(&mut self, customer: &Customer) -> InsertResult {
        if customer.first_name.is_none() || customer.last_name.is_none() {
            return Err(SinkRejection::new(
                RejectionKind::NotNullViolation,
                "customers.first_name / customers.last_name",
            ));
        }
        if self.customers.values().any(|c| c.email == customer.email) {
            return Err(SinkRejection::new(
                RejectionKind::UniqueViolation,
                format!("customers.email '{}' already exists", customer.email),
            ));
        }
        let id = self.allocate(0);
        self.customers.insert(id, customer.clone());
        Ok(id)
    }

    fn insert_product(&mut self, product: &Product) -> InsertResult {
        let Some(name) = product.product_name.as_deref() else {
            return Err(SinkRejection::new(
                RejectionKind::NotNullViolation,
                "products.product_name",
            ));
        };
        if self
            .products
            .values()
            .any(|p| p.product_name.as_deref() == Some(name))
        {
            return Err(SinkRejection::new(
                RejectionKind::UniqueViolation,
                format!("products.product_name '{name}' already exists"),
            ));
        }
        let id = self.allocate(1);
        self.products.insert(id, product.clone());
        Ok(id)
    }

    fn insert_order(&mut self, order: &Order) -> InsertResult {
        if order.order_date.is_none() {
            return Err(SinkRejection::new(
                RejectionKind::NotNullViolation,
                "orders.order_date",
            ));
        }
        if !self.customers.contains_key(&order.customer_id.0) {
            return Err(SinkRejection::new(
                RejectionKind::ForeignKeyViolation,
                format!("orders.customer_id {} does not exist", order.customer_id.0),
            ));
        }
        let id = self.allocate(2);
        self.orders.insert(id, order.clone());
        Ok(id)
    }

    fn insert_order_item(&mut self, item: &OrderItem) -> InsertResult {
        if !self.orders.contains_key(&item.order_id) {
            return Err(SinkRejection::new(
                RejectionKind::ForeignKeyViolation,
                format!("order_items.order_id {} does not exist", item.order_id),
            ));
        }
        if !self.products.contains_key(&item.product_id.0) {
            return Err(SinkRejection::new(
                RejectionKind::ForeignKeyViolation,
                format!("order_items.product_id {} does not exist", item.product_id.0),
            ));
        }
        let id = self.allocate(3);
        self.order_items.insert(id, item.clone());
        Ok(id)
    }
}

#[derive(Debug, Default)]
struct State {
    committed: Tables,
    /// Working copy while a unit of work is open
    open: Option<(Stage, Tables)>,
}

/// In-memory sink enforcing the same constraints as the relational schema.
/// Used for development and tests.
#[derive(Debug, Default)]
pub struct InMemorySink {
    state: Mutex<State>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose committed tables start out as `tables`
    pub fn with_tables(tables: Tables) -> Self {
        Self {
            state: Mutex::new(State {
                committed: tables,
                open: None,
            }),
        }
    }

    /// Snapshot of the committed rows
    pub fn committed(&self) -> Tables {
        match self.state.lock() {
            Ok(state) => state.committed.clone(),
            Err(poisoned) => poisoned.into_inner().committed.clone(),
        }
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, State>, SinkRejection> {
        self.state
            .lock()
            .map_err(|_| SinkRejection::new(RejectionKind::Unavailable, "sink state poisoned"))
    }

    fn with_open<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> std::result::Result<T, SinkRejection>,
    ) -> std::result::Result<T, SinkRejection> {
        let mut state = self.lock()?;
        match state.open.as_mut() {
            Some((_, tables)) => f(tables),
            None => Err(SinkRejection::new(
                RejectionKind::Unavailable,
                "no open unit of work",
            )),
        }
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn begin(&self, stage: Stage) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| EtlError::Database {
            message: "sink state poisoned".to_string(),
        })?;
        if let Some((open_stage, _)) = &state.open {
            return Err(EtlError::Database {
                message: format!("unit of work for {open_stage} is still open"),
            });
        }
        let working = state.committed.clone();
        state.open = Some((stage, working));
        debug!("Opened unit of work for {}", stage);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| EtlError::Database {
            message: "sink state poisoned".to_string(),
        })?;
        let (stage, working) = state.open.take().ok_or_else(|| EtlError::Database {
            message: "commit without an open unit of work".to_string(),
        })?;
        state.committed = working;
        debug!("Committed unit of work for {}", stage);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| EtlError::Database {
            message: "sink state poisoned".to_string(),
        })?;
        state.open = None;
        Ok(())
    }

    async fn insert_customer(&self, customer: &Customer) -> InsertResult {
        self.with_open(|tables| tables.insert_customer(customer))
    }

    async fn insert_product(&self, product: &Product) -> InsertResult {
        self.with_open(|tables| tables.insert_product(product))
    }

    async fn insert_order(&self, order: &Order) -> InsertResult {
        self.with_open(|tables| tables.insert_order(order))
    }

    async fn insert_order_item(&self, item: &OrderItem) -> InsertResult {
        self.with_open(|tables| tables.insert_order_item(item))
    }

    async fn retract_order(&self, order_id: i64) -> std::result::Result<(), SinkRejection> {
        self.with_open(|tables| {
            tables.orders.remove(&order_id).map(|_| ()).ok_or_else(|| {
                SinkRejection::new(RejectionKind::Other, format!("order {order_id} not found"))
            })
        })
    }
}
