//! Within-batch deduplication.
//!
//! Customers are compared on the whole raw row, so only exact re-extractions
//! collapse. Sales are keyed by transaction id. Products are not deduplicated
//! here; the sink's unique constraint rejects repeats at load time.

use std::collections::HashSet;
use std::hash::Hash;

use crate::normalize::present;
use crate::types::{RawCustomer, RawSale};

/// Keep the first occurrence of every key. Records whose key is `None` are
/// never considered duplicates of each other.
///
/// Returns the kept records and the dropped ones, both in input order.
pub fn dedup_by_key<T, K, F>(records: Vec<T>, key: F) -> (Vec<T>, Vec<T>)
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(records.len());
    let mut dropped = Vec::new();

    for record in records {
        let first_seen = key(&record).map_or(true, |k| seen.insert(k));
        if first_seen {
            kept.push(record);
        } else {
            dropped.push(record);
        }
    }

    (kept, dropped)
}

/// Drop customer rows equal in every field to an earlier row
pub fn dedup_customers<T: AsRef<RawCustomer>>(records: Vec<T>) -> (Vec<T>, Vec<T>) {
    dedup_by_key(records, |record| Some(record.as_ref().clone()))
}

/// Keep the first sales row for each transaction id
pub fn dedup_sales<T: AsRef<RawSale>>(records: Vec<T>) -> (Vec<T>, Vec<T>) {
    dedup_by_key(records, |record| {
        present(record.as_ref().transaction_id.as_deref()).map(str::to_string)
    })
}
