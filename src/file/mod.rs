//! JSON and CSV file helpers.
//!
//! Format errors are returned as-is (wrapped with the offending path); they
//! are never retried.

mod csv;
mod json;

pub use self::csv::{
    CsvReadOptions, CsvWriteOptions, DictRow, WriteMode, read_csv, read_csv_dicts, to_csv, to_csv_dicts,
};
pub use self::json::{JsonOptions, dump_json, load_json, to_json_string};
