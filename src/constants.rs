//! Constants shared by the normalizers, the extract readers and the CLI.

/// Country code prefixed to every normalized phone number
pub const PHONE_COUNTRY_CODE: &str = "91";

/// Number of trailing digits kept from a raw phone number
pub const PHONE_DIGITS: usize = 10;

/// Date layouts accepted in extracts, tried in this order
pub const DATE_LAYOUTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%m-%d-%Y", "%m/%d/%Y"];

/// Raw cell values that mean "no value" in upstream extracts
pub const MISSING_TOKENS: [&str; 8] = ["NA", "N/A", "NaN", "nan", "NULL", "null", "None", "none"];

/// Order status used when a sales row carries none
pub const DEFAULT_ORDER_STATUS: &str = "Pending";

// Identifier type tags
pub const CUSTOMER_TAG: char = 'C';
pub const PRODUCT_TAG: char = 'P';

// Defaults for configuration
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_DB_PATH: &str = "data/fleximart.db";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const CUSTOMERS_FILE: &str = "customers_raw.csv";
pub const PRODUCTS_FILE: &str = "products_raw.csv";
pub const SALES_FILE: &str = "sales_raw.csv";
