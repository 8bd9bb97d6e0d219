//! Helpers for scraping chores: JSON and CSV files, and HTTP GET/POST with
//! bounded retry on transport failure.

pub mod file;
pub mod http;
pub mod retry;

pub use file::{
    CsvReadOptions, CsvWriteOptions, DictRow, JsonOptions, WriteMode, dump_json, load_json, read_csv,
    read_csv_dicts, to_csv, to_csv_dicts,
};
pub use http::{HttpClient, RequestOptions, get, post};
pub use retry::{RetryError, RetryPolicy, Retried};
