//! Record cleaners: apply the field normalizers to whole records, decide
//! admissibility, and keep a reason for every record that is dropped.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, info};

use crate::constants::DEFAULT_ORDER_STATUS;
use crate::dedup;
use crate::normalize::{normalize_category, normalize_phone, parse_date, present, trim_text};
use crate::report::{SkipReason, SkippedRecord};
use crate::types::{Customer, Product, RawCustomer, RawProduct, RawSale, Row, Sale, Stage};

/// Output of a cleaner: admissible records in extract order plus the drop log
#[derive(Debug, Clone)]
pub struct Cleaned<T> {
    pub input_rows: usize,
    pub admissible: Vec<T>,
    pub dropped: Vec<SkippedRecord>,
}

impl<T> Cleaned<T> {
    fn new(input_rows: usize) -> Self {
        Self {
            input_rows,
            admissible: Vec::with_capacity(input_rows),
            dropped: Vec::new(),
        }
    }

    fn drop_record(&mut self, record_id: String, reason: SkipReason) {
        debug!(record = %record_id, "Dropping record: {}", reason);
        self.dropped.push(SkippedRecord { record_id, reason });
    }

    fn report(&self, stage: Stage) {
        info!(
            stage = %stage,
            input = self.input_rows,
            admissible = self.admissible.len(),
            "Cleaned {} of {} {} rows",
            self.admissible.len(),
            self.input_rows,
            stage
        );
    }
}

/// Identify a raw row by its natural key when present, else by line number
fn record_id(key: Option<&str>, line: usize) -> String {
    match present(key) {
        Some(key) => key.to_string(),
        None => format!("line {line}"),
    }
}

pub fn clean_customers(raw: Vec<RawCustomer>) -> Cleaned<Customer> {
    let mut cleaned = Cleaned::new(raw.len());
    let (rows, duplicates) = dedup::dedup_customers(Row::number(raw));

    for row in duplicates {
        let id = record_id(row.record.email.as_deref(), row.line);
        cleaned.drop_record(
            id,
            SkipReason::Duplicate {
                key: format!("identical to an earlier row, line {}", row.line),
            },
        );
    }

    for Row { line, record } in rows {
        let Some(email) = present(record.email.as_deref()) else {
            cleaned.drop_record(
                record_id(None, line),
                SkipReason::inadmissible("email", "is missing"),
            );
            continue;
        };

        let registration_date = parse_date(record.registration_date.as_deref());
        if registration_date.is_none() && present(record.registration_date.as_deref()).is_some() {
            debug!(record = %email, "Unparseable registration_date, leaving it absent");
        }

        cleaned.admissible.push(Customer {
            first_name: trim_text(record.first_name.as_deref()),
            last_name: trim_text(record.last_name.as_deref()),
            email: email.to_string(),
            phone: normalize_phone(record.phone.as_deref()),
            city: trim_text(record.city.as_deref()),
            registration_date,
        });
    }

    cleaned.report(Stage::Customers);
    cleaned
}

pub fn clean_products(raw: Vec<RawProduct>) -> Cleaned<Product> {
    let mut cleaned = Cleaned::new(raw.len());

    for Row { line, record } in Row::number(raw) {
        let id = record_id(record.product_name.as_deref(), line);

        let price = match parse_positive_decimal(record.price.as_deref()) {
            Ok(price) => price,
            Err(problem) => {
                cleaned.drop_record(id, SkipReason::inadmissible("price", problem));
                continue;
            }
        };

        let stock_quantity = match present(record.stock_quantity.as_deref()) {
            None => 0,
            Some(raw_stock) => match parse_whole_number(raw_stock) {
                Some(stock) if stock < 0 => {
                    cleaned.drop_record(
                        id,
                        SkipReason::inadmissible("stock_quantity", "must not be negative"),
                    );
                    continue;
                }
                Some(stock) => stock,
                None => {
                    debug!(record = %id, "Unparseable stock_quantity '{}', defaulting to 0", raw_stock);
                    0
                }
            },
        };

        cleaned.admissible.push(Product {
            product_name: trim_text(record.product_name.as_deref()),
            category: normalize_category(record.category.as_deref()),
            price,
            stock_quantity,
        });
    }

    cleaned.report(Stage::Products);
    cleaned
}

pub fn clean_sales(raw: Vec<RawSale>) -> Cleaned<Sale> {
    let mut cleaned = Cleaned::new(raw.len());
    let (rows, duplicates) = dedup::dedup_sales(Row::number(raw));

    for row in duplicates {
        let id = record_id(row.record.transaction_id.as_deref(), row.line);
        cleaned.drop_record(
            id.clone(),
            SkipReason::Duplicate {
                key: format!("transaction_id {id}"),
            },
        );
    }

    for Row { line, record } in rows {
        let id = record_id(record.transaction_id.as_deref(), line);
        match clean_sale(&record) {
            Ok(sale) => cleaned.admissible.push(sale),
            Err(reason) => cleaned.drop_record(id, reason),
        }
    }

    cleaned.report(Stage::Sales);
    cleaned
}

fn clean_sale(record: &RawSale) -> Result<Sale, SkipReason> {
    let transaction_id = present(record.transaction_id.as_deref())
        .ok_or_else(|| SkipReason::inadmissible("transaction_id", "is missing"))?;
    let customer_ref = present(record.customer_id.as_deref())
        .ok_or_else(|| SkipReason::inadmissible("customer_id", "is missing"))?;
    let product_ref = present(record.product_id.as_deref())
        .ok_or_else(|| SkipReason::inadmissible("product_id", "is missing"))?;

    let quantity = present(record.quantity.as_deref())
        .and_then(parse_whole_number)
        .ok_or_else(|| SkipReason::inadmissible("quantity", "is missing or not a whole number"))?;
    if quantity <= 0 {
        return Err(SkipReason::inadmissible("quantity", "must be positive"));
    }

    let unit_price = parse_positive_decimal(record.unit_price.as_deref())
        .map_err(|problem| SkipReason::inadmissible("unit_price", problem))?;

    let transaction_date = parse_date(record.transaction_date.as_deref());
    if transaction_date.is_none() && present(record.transaction_date.as_deref()).is_some() {
        debug!(record = %transaction_id, "Unparseable transaction_date, leaving it absent");
    }

    Ok(Sale {
        transaction_id: transaction_id.to_string(),
        customer_ref: customer_ref.to_string(),
        product_ref: product_ref.to_string(),
        quantity,
        unit_price,
        transaction_date,
        status: trim_text(record.status.as_deref())
            .unwrap_or_else(|| DEFAULT_ORDER_STATUS.to_string()),
    })
}

/// A required, strictly positive decimal amount
fn parse_positive_decimal(raw: Option<&str>) -> Result<Decimal, String> {
    let raw = present(raw).ok_or_else(|| "is missing".to_string())?;
    let value = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if value <= Decimal::ZERO {
        return Err(format!("must be positive, got {value}"));
    }
    Ok(value)
}

/// Integers, also accepting integral decimals such as "12.0"
fn parse_whole_number(raw: &str) -> Option<i64> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let value = Decimal::from_str(raw).ok()?;
    if value.fract().is_zero() {
        value.to_i64()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw_customer(email: Option<&str>) -> RawCustomer {
        RawCustomer {
            first_name: Some(" Priya ".to_string()),
            last_name: Some("Patel".to_string()),
            email: email.map(str::to_string),
            phone: Some("98765-43210".to_string()),
            city: Some("Mumbai".to_string()),
            registration_date: Some("15/03/2023".to_string()),
        }
    }

    fn raw_product(name: &str, price: Option<&str>, stock: Option<&str>) -> RawProduct {
        RawProduct {
            product_name: Some(name.to_string()),
            category: Some(" electronics".to_string()),
            price: price.map(str::to_string),
            stock_quantity: stock.map(str::to_string),
        }
    }

    fn raw_sale(id: &str, customer: Option<&str>, product: Option<&str>) -> RawSale {
        RawSale {
            transaction_id: Some(id.to_string()),
            customer_id: customer.map(str::to_string),
            product_id: product.map(str::to_string),
            quantity: Some("2".to_string()),
            unit_price: Some("50.0".to_string()),
            transaction_date: Some("2024-01-15".to_string()),
            status: Some("Completed".to_string()),
        }
    }

    #[test]
    fn test_clean_customers_normalizes_fields() {
        let cleaned = clean_customers(vec![raw_customer(Some("priya@example.com"))]);
        assert_eq!(cleaned.input_rows, 1);
        assert_eq!(cleaned.admissible.len(), 1);

        let customer = &cleaned.admissible[0];
        assert_eq!(customer.first_name.as_deref(), Some("Priya"));
        assert_eq!(customer.phone.as_deref(), Some("+91-9876543210"));
        assert_eq!(customer.registration_date, NaiveDate::from_ymd_opt(2023, 3, 15));
    }

    #[test]
    fn test_clean_customers_drops_missing_email_and_exact_duplicates() {
        let cleaned = clean_customers(vec![
            raw_customer(Some("priya@example.com")),
            raw_customer(Some("priya@example.com")),
            raw_customer(None),
            raw_customer(Some("  ")),
        ]);

        assert_eq!(cleaned.admissible.len(), 1);
        assert_eq!(cleaned.dropped.len(), 3);
        assert!(matches!(cleaned.dropped[0].reason, SkipReason::Duplicate { .. }));
        assert_eq!(cleaned.dropped[1].record_id, "line 4");
        assert_eq!(
            cleaned.dropped[1].reason,
            SkipReason::inadmissible("email", "is missing")
        );
    }

    #[test]
    fn test_clean_customers_keeps_duplicate_present_emails() {
        let mut second = raw_customer(Some("priya@example.com"));
        second.city = Some("Pune".to_string());

        let cleaned = clean_customers(vec![raw_customer(Some("priya@example.com")), second]);
        assert_eq!(cleaned.admissible.len(), 2);
        assert!(cleaned.dropped.is_empty());
    }

    #[test]
    fn test_clean_customers_bad_phone_and_date_become_absent() {
        let mut raw = raw_customer(Some("x@example.com"));
        raw.phone = Some("NA".to_string());
        raw.registration_date = Some("sometime in 2023".to_string());

        let cleaned = clean_customers(vec![raw]);
        assert_eq!(cleaned.admissible.len(), 1);
        assert_eq!(cleaned.admissible[0].phone, None);
        assert_eq!(cleaned.admissible[0].registration_date, None);
    }

    #[test]
    fn test_clean_products() {
        let cleaned = clean_products(vec![
            raw_product(" Laptop Pro ", Some("52999.00"), Some("15")),
            raw_product("Mouse", None, Some("3")),
            raw_product("Cable", Some("199"), None),
            raw_product("Desk", Some("abc"), None),
            raw_product("Chair", Some("-5"), None),
            raw_product("Lamp", Some("899"), Some("-1")),
            raw_product("Fan", Some("1499"), Some("12.0")),
        ]);

        assert_eq!(cleaned.input_rows, 7);
        let names: Vec<_> = cleaned
            .admissible
            .iter()
            .map(|p| p.product_name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["Laptop Pro", "Cable", "Fan"]);
        assert_eq!(cleaned.admissible[0].category.as_deref(), Some("Electronics"));
        assert_eq!(cleaned.admissible[0].price, Decimal::from_str("52999.00").unwrap());
        assert_eq!(cleaned.admissible[1].stock_quantity, 0);
        assert_eq!(cleaned.admissible[2].stock_quantity, 12);

        let dropped: Vec<_> = cleaned.dropped.iter().map(|d| d.record_id.as_str()).collect();
        assert_eq!(dropped, vec!["Mouse", "Desk", "Chair", "Lamp"]);
        assert_eq!(
            cleaned.dropped[0].reason,
            SkipReason::inadmissible("price", "is missing")
        );
    }

    #[test]
    fn test_clean_sales_dedups_then_checks_references() {
        let mut repeat = raw_sale("T001", Some("C001"), Some("P001"));
        repeat.quantity = Some("9".to_string());

        let cleaned = clean_sales(vec![
            raw_sale("T001", Some("C001"), Some("P001")),
            repeat,
            raw_sale("T002", None, Some("P002")),
            raw_sale("T003", Some("C003"), Some("")),
            raw_sale("T004", Some("C004"), Some("P004")),
        ]);

        let ids: Vec<_> = cleaned
            .admissible
            .iter()
            .map(|s| s.transaction_id.as_str())
            .collect();
        assert_eq!(ids, vec!["T001", "T004"]);
        assert_eq!(cleaned.admissible[0].quantity, 2);
        assert_eq!(cleaned.dropped.len(), 3);
        assert!(matches!(cleaned.dropped[0].reason, SkipReason::Duplicate { .. }));
        assert_eq!(
            cleaned.dropped[1].reason,
            SkipReason::inadmissible("customer_id", "is missing")
        );
        assert_eq!(
            cleaned.dropped[2].reason,
            SkipReason::inadmissible("product_id", "is missing")
        );
    }

    #[test]
    fn test_clean_sales_field_rules() {
        let mut no_date = raw_sale("T010", Some("C1"), Some("P1"));
        no_date.transaction_date = Some("15.01.2024".to_string());
        no_date.status = None;

        let mut zero_quantity = raw_sale("T011", Some("C1"), Some("P1"));
        zero_quantity.quantity = Some("0".to_string());

        let mut fractional = raw_sale("T012", Some("C1"), Some("P1"));
        fractional.quantity = Some("1.5".to_string());

        let mut free = raw_sale("T013", Some("C1"), Some("P1"));
        free.unit_price = Some("0".to_string());

        let cleaned = clean_sales(vec![no_date, zero_quantity, fractional, free]);
        assert_eq!(cleaned.admissible.len(), 1);
        assert_eq!(cleaned.admissible[0].transaction_date, None);
        assert_eq!(cleaned.admissible[0].status, DEFAULT_ORDER_STATUS);
        assert_eq!(cleaned.admissible[0].unit_price, Decimal::from_str("50.0").unwrap());

        let fields: Vec<_> = cleaned
            .dropped
            .iter()
            .map(|d| match &d.reason {
                SkipReason::Inadmissible { field, .. } => *field,
                other => panic!("unexpected reason {other:?}"),
            })
            .collect();
        assert_eq!(fields, vec!["quantity", "quantity", "unit_price"]);
    }

    #[test]
    fn test_parse_whole_number() {
        assert_eq!(parse_whole_number("7"), Some(7));
        assert_eq!(parse_whole_number("7.00"), Some(7));
        assert_eq!(parse_whole_number("-3"), Some(-3));
        assert_eq!(parse_whole_number("7.5"), None);
        assert_eq!(parse_whole_number("seven"), None);
    }
}
