use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entity stage of a run. Stages always execute in `Stage::ORDERED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Customers,
    Products,
    Sales,
}

impl Stage {
    /// Sales rows reference customers and products, so they load last
    pub const ORDERED: [Stage; 3] = [Stage::Customers, Stage::Products, Stage::Sales];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Customers => "customers",
            Stage::Products => "products",
            Stage::Sales => "sales",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Raw extract rows. Every cell is optional text; interpretation happens in
// the cleaners.
// ---------------------------------------------------------------------------

/// A row of the customers extract
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawCustomer {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub registration_date: Option<String>,
}

/// A row of the products extract
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawProduct {
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub price: Option<String>,
    pub stock_quantity: Option<String>,
}

/// A row of the sales extract
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawSale {
    pub transaction_id: Option<String>,
    pub customer_id: Option<String>,
    pub product_id: Option<String>,
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
    pub transaction_date: Option<String>,
    pub status: Option<String>,
}

/// A raw row together with its line number in the extract (header is line 1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row<T> {
    pub line: usize,
    pub record: T,
}

impl<T> Row<T> {
    /// Number rows in extract order, starting after the header line
    pub fn number(records: Vec<T>) -> Vec<Row<T>> {
        records
            .into_iter()
            .enumerate()
            .map(|(i, record)| Row { line: i + 2, record })
            .collect()
    }
}

impl<T> AsRef<T> for Row<T> {
    fn as_ref(&self) -> &T {
        &self.record
    }
}

impl AsRef<RawCustomer> for RawCustomer {
    fn as_ref(&self) -> &RawCustomer {
        self
    }
}

impl AsRef<RawSale> for RawSale {
    fn as_ref(&self) -> &RawSale {
        self
    }
}

// ---------------------------------------------------------------------------
// Canonical records, ready for the sink.
// ---------------------------------------------------------------------------

/// A cleaned customer. `email` is always present and non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub registration_date: Option<NaiveDate>,
}

/// A cleaned product. `price` is always present and positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub price: Decimal,
    pub stock_quantity: i64,
}

/// A cleaned sales record whose customer/product references are still the
/// external tagged identifiers (`C00123`, `P00045`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub transaction_id: String,
    pub customer_ref: String,
    pub product_ref: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub transaction_date: Option<NaiveDate>,
    pub status: String,
}

/// Internal primary key of a customer row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerKey(pub i64);

/// Internal primary key of a product row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductKey(pub i64);

/// An order header, one per admissible sales record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub customer_id: CustomerKey,
    pub order_date: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub status: String,
}

/// The single line item of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: i64,
    pub product_id: ProductKey,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// `quantity × unit_price` in exact decimal arithmetic
pub fn line_total(quantity: i64, unit_price: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price
}

impl Order {
    pub fn for_sale(sale: &Sale, customer_id: CustomerKey) -> Self {
        Self {
            customer_id,
            order_date: sale.transaction_date,
            total_amount: line_total(sale.quantity, sale.unit_price),
            status: sale.status.clone(),
        }
    }
}

impl OrderItem {
    pub fn for_sale(sale: &Sale, order_id: i64, product_id: ProductKey) -> Self {
        Self {
            order_id,
            product_id,
            quantity: sale.quantity,
            unit_price: sale.unit_price,
            subtotal: line_total(sale.quantity, sale.unit_price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_order_and_item_share_line_total() {
        let sale = Sale {
            transaction_id: "T001".to_string(),
            customer_ref: "C7".to_string(),
            product_ref: "P3".to_string(),
            quantity: 3,
            unit_price: Decimal::from_str("19.99").unwrap(),
            transaction_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            status: "Completed".to_string(),
        };

        let order = Order::for_sale(&sale, CustomerKey(7));
        let item = OrderItem::for_sale(&sale, 1, ProductKey(3));

        assert_eq!(order.total_amount, Decimal::from_str("59.97").unwrap());
        assert_eq!(item.subtotal, order.total_amount);
        assert_eq!(item.subtotal, Decimal::from(item.quantity) * item.unit_price);
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(
            Stage::ORDERED.iter().map(Stage::as_str).collect::<Vec<_>>(),
            vec!["customers", "products", "sales"]
        );
    }
}
