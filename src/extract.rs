use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::ExtractsConfig;
use crate::error::{EtlError, Result};
use crate::types::{RawCustomer, RawProduct, RawSale};

/// Source of the three raw extracts. Each extract is read once, at the start
/// of its stage; a read failure aborts the run.
pub trait ExtractSource: Send + Sync {
    fn customers(&self) -> Result<Vec<RawCustomer>>;
    fn products(&self) -> Result<Vec<RawProduct>>;
    fn sales(&self) -> Result<Vec<RawSale>>;
}

/// Header-named CSV files on disk
#[derive(Debug, Clone)]
pub struct CsvExtracts {
    pub customers: PathBuf,
    pub products: PathBuf,
    pub sales: PathBuf,
}

impl CsvExtracts {
    pub fn new(customers: PathBuf, products: PathBuf, sales: PathBuf) -> Self {
        Self {
            customers,
            products,
            sales,
        }
    }

    pub fn from_config(config: &ExtractsConfig) -> Self {
        Self::new(
            config.customers_path(),
            config.products_path(),
            config.sales_path(),
        )
    }
}

impl ExtractSource for CsvExtracts {
    fn customers(&self) -> Result<Vec<RawCustomer>> {
        read_csv(&self.customers, "customers")
    }

    fn products(&self) -> Result<Vec<RawProduct>> {
        read_csv(&self.products, "products")
    }

    fn sales(&self) -> Result<Vec<RawSale>> {
        read_csv(&self.sales, "sales")
    }
}

/// Deserialize every row of a CSV file. Cells are trimmed and short rows
/// leave their trailing columns absent.
pub fn read_csv<T: DeserializeOwned>(path: &Path, entity: &'static str) -> Result<Vec<T>> {
    debug!("Reading {} extract from {}", entity, path.display());
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| EtlError::Extract {
            entity,
            message: format!("cannot open {}: {}", path.display(), e),
        })?;

    let mut rows = Vec::new();
    for (index, result) in reader.deserialize().enumerate() {
        let row: T = result.map_err(|e| EtlError::Extract {
            entity,
            // header is line 1
            message: format!("{} line {}: {}", path.display(), index + 2, e),
        })?;
        rows.push(row);
    }

    info!("Read {} {} rows from {}", rows.len(), entity, path.display());
    Ok(rows)
}

/// Extracts that are already parsed
#[derive(Debug, Clone, Default)]
pub struct InMemoryExtracts {
    pub customers: Vec<RawCustomer>,
    pub products: Vec<RawProduct>,
    pub sales: Vec<RawSale>,
}

impl ExtractSource for InMemoryExtracts {
    fn customers(&self) -> Result<Vec<RawCustomer>> {
        Ok(self.customers.clone())
    }

    fn products(&self) -> Result<Vec<RawProduct>> {
        Ok(self.products.clone())
    }

    fn sales(&self) -> Result<Vec<RawSale>> {
        Ok(self.sales.clone())
    }
}
