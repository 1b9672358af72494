use tracing::{debug, error, instrument, warn};

use crate::error::Result;
use crate::report::{RecordOutcome, SkipReason};
use crate::resolver::{resolve_customer, resolve_product};
use crate::storage::Sink;
use crate::types::{Customer, Order, OrderItem, Product, Sale, Stage};

/// Loads one entity batch per call inside a single unit of work.
///
/// Every record gets exactly one `RecordOutcome`; a rejected insert is
/// recorded and the batch carries on. Only opening or committing the unit of
/// work can fail the call.
pub struct Loader<'a> {
    sink: &'a dyn Sink,
}

impl std::fmt::Debug for Loader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("sink", &"<dyn Sink>")
            .finish()
    }
}

impl<'a> Loader<'a> {
    pub fn new(sink: &'a dyn Sink) -> Self {
        Self { sink }
    }

    #[instrument(skip_all, fields(records = batch.len()))]
    pub async fn load_customers(&self, batch: &[Customer]) -> Result<Vec<RecordOutcome>> {
        self.sink.begin(Stage::Customers).await?;

        let mut outcomes = Vec::with_capacity(batch.len());
        for customer in batch {
            let result = self
                .sink
                .insert_customer(customer)
                .await
                .map_err(SkipReason::from);
            outcomes.push(outcome(customer.email.clone(), result));
        }

        self.commit(Stage::Customers).await?;
        Ok(outcomes)
    }

    #[instrument(skip_all, fields(records = batch.len()))]
    pub async fn load_products(&self, batch: &[Product]) -> Result<Vec<RecordOutcome>> {
        self.sink.begin(Stage::Products).await?;

        let mut outcomes = Vec::with_capacity(batch.len());
        for (index, product) in batch.iter().enumerate() {
            let record_id = product
                .product_name
                .clone()
                .unwrap_or_else(|| format!("product #{}", index + 1));
            let result = self
                .sink
                .insert_product(product)
                .await
                .map_err(SkipReason::from);
            outcomes.push(outcome(record_id, result));
        }

        self.commit(Stage::Products).await?;
        Ok(outcomes)
    }

    /// Each sale becomes an order plus its single order item. The outcome
    /// carries the new order id.
    #[instrument(skip_all, fields(records = batch.len()))]
    pub async fn load_sales(&self, batch: &[Sale]) -> Result<Vec<RecordOutcome>> {
        self.sink.begin(Stage::Sales).await?;

        let mut outcomes = Vec::with_capacity(batch.len());
        for sale in batch {
            let result = self.load_sale(sale).await;
            outcomes.push(outcome(sale.transaction_id.clone(), result));
        }

        self.commit(Stage::Sales).await?;
        Ok(outcomes)
    }

    async fn load_sale(&self, sale: &Sale) -> std::result::Result<i64, SkipReason> {
        let customer_id = resolve_customer(&sale.customer_ref)?;
        let product_id = resolve_product(&sale.product_ref)?;

        let order_id = self
            .sink
            .insert_order(&Order::for_sale(sale, customer_id))
            .await?;

        let item = OrderItem::for_sale(sale, order_id, product_id);
        if let Err(rejection) = self.sink.insert_order_item(&item).await {
            // an order is never committed without its line item
            if let Err(e) = self.sink.retract_order(order_id).await {
                error!(
                    transaction = %sale.transaction_id,
                    "Failed to retract order {} after item rejection: {}", order_id, e
                );
            }
            return Err(rejection.into());
        }

        debug!(transaction = %sale.transaction_id, "Loaded order {}", order_id);
        Ok(order_id)
    }

    async fn commit(&self, stage: Stage) -> Result<()> {
        if let Err(e) = self.sink.commit().await {
            error!("Commit failed for {} stage: {}", stage, e);
            if let Err(rollback_err) = self.sink.rollback().await {
                warn!("Rollback after failed commit also failed: {}", rollback_err);
            }
            return Err(e);
        }
        debug!("Committed {} stage", stage);
        Ok(())
    }
}

fn outcome(record_id: String, result: std::result::Result<i64, SkipReason>) -> RecordOutcome {
    if let Err(reason) = &result {
        warn!(record = %record_id, "Skipping record: {}", reason);
    }
    RecordOutcome { record_id, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::storage::{InMemorySink, InsertResult, RejectionKind, SinkRejection, Tables};
    use crate::types::ProductKey;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn customer(email: &str) -> Customer {
        Customer {
            first_name: Some("Vikram".to_string()),
            last_name: Some("Singh".to_string()),
            email: email.to_string(),
            phone: None,
            city: Some("Delhi".to_string()),
            registration_date: None,
        }
    }

    fn product(name: &str) -> Product {
        Product {
            product_name: Some(name.to_string()),
            category: Some("Electronics".to_string()),
            price: Decimal::from(500),
            stock_quantity: 10,
        }
    }

    fn sale(id: &str, customer_ref: &str, product_ref: &str) -> Sale {
        Sale {
            transaction_id: id.to_string(),
            customer_ref: customer_ref.to_string(),
            product_ref: product_ref.to_string(),
            quantity: 2,
            unit_price: Decimal::from_str("50.0").unwrap(),
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, 10),
            status: "Completed".to_string(),
        }
    }

    fn seeded_sink(customers: usize, products: usize) -> InMemorySink {
        let mut tables = Tables::default();
        for i in 0..customers {
            tables.seed_customer(customer(&format!("seed{i}@example.com")));
        }
        for i in 0..products {
            tables.seed_product(product(&format!("Seed product {i}")));
        }
        InMemorySink::with_tables(tables)
    }

    #[tokio::test]
    async fn test_duplicate_email_yields_one_commit_and_one_skip() {
        let sink = InMemorySink::new();
        let loader = Loader::new(&sink);

        let outcomes = loader
            .load_customers(&[customer("dup@example.com"), customer("dup@example.com")])
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].result, Ok(1));
        assert!(matches!(
            &outcomes[1].result,
            Err(SkipReason::SinkRejected(SinkRejection {
                kind: RejectionKind::UniqueViolation,
                ..
            }))
        ));
        assert_eq!(sink.committed().customers.len(), 1);
    }

    #[tokio::test]
    async fn test_sale_creates_order_and_item_with_exact_totals() {
        let sink = seeded_sink(7, 3);
        let loader = Loader::new(&sink);

        let outcomes = loader.load_sales(&[sale("T100", "C7", "P3")]).await.unwrap();
        let order_id = outcomes[0].result.clone().unwrap();

        let tables = sink.committed();
        let order = &tables.orders[&order_id];
        assert_eq!(order.customer_id.0, 7);
        assert_eq!(order.total_amount, Decimal::from(100));

        let item = tables.order_items.values().next().unwrap();
        assert_eq!(item.order_id, order_id);
        assert_eq!(item.product_id, ProductKey(3));
        assert_eq!(item.subtotal, Decimal::from(100));
        assert_eq!(item.subtotal, Decimal::from(item.quantity) * item.unit_price);
    }

    #[tokio::test]
    async fn test_malformed_identifier_skips_without_sink_call() {
        let sink = seeded_sink(1, 1);
        let loader = Loader::new(&sink);

        let outcomes = loader
            .load_sales(&[sale("T1", "CX1", "P1"), sale("T2", "C1", "P1")])
            .await
            .unwrap();

        assert!(matches!(
            outcomes[0].result,
            Err(SkipReason::IdentifierMalformed(_))
        ));
        assert!(outcomes[1].result.is_ok());
        assert_eq!(sink.committed().orders.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_order_means_no_item() {
        let sink = seeded_sink(1, 1);
        let loader = Loader::new(&sink);

        let outcomes = loader.load_sales(&[sale("T1", "C42", "P1")]).await.unwrap();
        assert!(matches!(
            &outcomes[0].result,
            Err(SkipReason::SinkRejected(SinkRejection {
                kind: RejectionKind::ForeignKeyViolation,
                ..
            }))
        ));
        let tables = sink.committed();
        assert!(tables.orders.is_empty());
        assert!(tables.order_items.is_empty());
    }

    #[tokio::test]
    async fn test_failed_item_retracts_its_order() {
        let sink = seeded_sink(1, 1);
        let loader = Loader::new(&sink);

        let outcomes = loader
            .load_sales(&[sale("T1", "C1", "P99"), sale("T2", "C1", "P1")])
            .await
            .unwrap();

        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
        let tables = sink.committed();
        assert_eq!(tables.orders.len(), 1);
        assert_eq!(tables.order_items.len(), 1);
    }

    /// Accepts inserts but refuses to commit
    #[derive(Default)]
    struct CommitFailingSink {
        inserts: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    #[async_trait]
    impl Sink for CommitFailingSink {
        async fn begin(&self, _stage: Stage) -> Result<()> {
            Ok(())
        }
        async fn commit(&self) -> Result<()> {
            Err(EtlError::Database {
                message: "disk full".to_string(),
            })
        }
        async fn rollback(&self) -> Result<()> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn insert_customer(&self, _customer: &Customer) -> InsertResult {
            Ok(self.inserts.fetch_add(1, Ordering::SeqCst) as i64 + 1)
        }
        async fn insert_product(&self, _product: &Product) -> InsertResult {
            unreachable!()
        }
        async fn insert_order(&self, _order: &Order) -> InsertResult {
            unreachable!()
        }
        async fn insert_order_item(&self, _item: &OrderItem) -> InsertResult {
            unreachable!()
        }
        async fn retract_order(&self, _order_id: i64) -> std::result::Result<(), SinkRejection> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_commit_failure_is_fatal_and_rolls_back() {
        let sink = CommitFailingSink::default();
        let loader = Loader::new(&sink);

        let result = loader.load_customers(&[customer("a@example.com")]).await;
        assert!(matches!(result, Err(EtlError::Database { .. })));
        assert_eq!(sink.inserts.load(Ordering::SeqCst), 1);
        assert_eq!(sink.rollbacks.load(Ordering::SeqCst), 1);
    }
}
