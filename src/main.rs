use anyhow::{Context, Result};
use clap::Parser;
use scrap_utils::file::{
    CsvReadOptions, CsvWriteOptions, JsonOptions, WriteMode, dump_json, load_json,
    read_csv_dicts, to_csv, to_csv_dicts,
};
use scrap_utils::{HttpClient, RequestOptions, RetryPolicy};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// scrap-utils - scraping chores from the command line
///
/// Fetch pages with bounded retry and convert between JSON and CSV.
///
/// Examples:
///   scrap-utils get https://example.com -o page.html
///   scrap-utils --max-try 3 post https://example.com/api --json '{"q": 1}'
///   scrap-utils csv-to-json rows.csv rows.json
#[derive(Parser, Debug)]
#[command(author, version = env!("SCRAP_UTILS_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Seconds to wait between two attempts
    #[arg(
        long = "sleep-time",
        env = "SCRAP_UTILS_SLEEP_TIME",
        value_name = "SECS",
        default_value_t = 30,
        global = true
    )]
    sleep_time: u64,

    /// Total number of attempts per request
    #[arg(
        long = "max-try",
        env = "SCRAP_UTILS_MAX_TRY",
        value_name = "N",
        default_value_t = 5,
        global = true
    )]
    max_try: u32,

    /// Also retry when the response status is not 2xx
    #[arg(long = "retry-on-status", global = true)]
    retry_on_status: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send a GET request
    Get(RequestArgs),

    /// Send a POST request
    Post(PostArgs),

    /// Convert a CSV file with a header row into a JSON array of objects
    CsvToJson(ConvertArgs),

    /// Convert a JSON array of objects into a CSV file with a header row
    JsonToCsv(ConvertArgs),
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
    #[arg(value_name = "URL")]
    url: String,

    /// Request header, e.g. 'User-Agent: scraper'
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Query parameter, e.g. 'page=2'
    #[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
    query: Vec<String>,

    /// Per-attempt timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Write the response body to this file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct PostArgs {
    #[command(flatten)]
    request: RequestArgs,

    /// Raw request body
    #[arg(long, value_name = "BODY", conflicts_with = "json")]
    data: Option<String>,

    /// JSON request body
    #[arg(long, value_name = "JSON")]
    json: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    output: PathBuf,
}

impl Cli {
    fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(self.sleep_time), self.max_try)
            .with_retry_on_status(self.retry_on_status)
    }
}

impl RequestArgs {
    fn options(&self) -> Result<RequestOptions> {
        let mut options = RequestOptions::new();
        for header in &self.headers {
            let (name, value) = header
                .split_once(':')
                .with_context(|| format!("Header must look like 'Name: value', got {:?}", header))?;
            options = options.header(name.trim(), value.trim())?;
        }
        for pair in &self.query {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("Query must look like 'key=value', got {:?}", pair))?;
            options = options.query(key, value);
        }
        if let Some(secs) = self.timeout {
            options = options.timeout(Duration::from_secs(secs));
        }
        Ok(options)
    }
}

async fn write_response(args: &RequestArgs, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if !status.is_success() {
        log::warn!("{} answered with status {}", args.url, status);
    }
    let body = response
        .bytes()
        .await
        .context("Failed to read response body")?;

    match &args.output {
        Some(path) => std::fs::write(path, &body)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => std::io::stdout()
            .write_all(&body)
            .context("Failed to write to stdout")?,
    }
    log::debug!("{} bytes from {}", body.len(), args.url);
    Ok(())
}

fn csv_to_json(args: &ConvertArgs) -> Result<()> {
    let rows = read_csv_dicts(&args.input, &[] as &[&str], &CsvReadOptions::default())?;
    let objects: Vec<Map<String, Value>> = rows
        .into_iter()
        .map(|row| row.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
        .collect();
    dump_json(&objects, &args.output, &JsonOptions::default())
}

/// Columns are every key seen across all objects, in first-seen order.
fn json_to_csv(args: &ConvertArgs) -> Result<()> {
    let objects: Vec<Map<String, Value>> = load_json(&args.input)?;
    let mut fieldnames: Vec<String> = Vec::new();
    for key in objects.iter().flat_map(|object| object.keys()) {
        if !fieldnames.contains(key) {
            fieldnames.push(key.clone());
        }
    }

    let options = CsvWriteOptions {
        mode: WriteMode::Truncate,
        ..Default::default()
    };
    if fieldnames.is_empty() {
        log::warn!("{} holds no keys, writing an empty file", args.input.display());
        return to_csv(Vec::<Vec<String>>::new(), &args.output, &options);
    }

    let rows = objects.into_iter().map(|object| {
        object
            .into_iter()
            .map(|(key, value)| (key, field_text(value)))
            .collect::<Vec<(String, String)>>()
    });
    to_csv_dicts(rows, &args.output, &fieldnames, &options)
}

fn field_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let policy = cli.policy();
    let client = HttpClient::default();

    match &cli.command {
        Commands::Get(args) => {
            let response = client.get(&args.url, &policy, &args.options()?).await?;
            write_response(args, response).await?
        }
        Commands::Post(args) => {
            let mut options = args.request.options()?;
            if let Some(data) = &args.data {
                options = options.body(data.clone());
            }
            if let Some(json) = &args.json {
                let body: Value = serde_json::from_str(json).context("Invalid --json body")?;
                options = options.json(&body)?;
            }
            let response = client.post(&args.request.url, &policy, &options).await?;
            write_response(&args.request, response).await?
        }
        Commands::CsvToJson(args) => csv_to_json(args)?,
        Commands::JsonToCsv(args) => json_to_csv(args)?,
    }
    Ok(())
}
