// ABOUTME: CLI binary for the wtw-scrape product scraper.
// ABOUTME: Scrapes H&M, Pinterest and Zalando URLs and prints records as JSON or text.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use wtw_scrape::{Client, ScrapedRecord, Site, TorControlConfig};

#[derive(Parser, Debug)]
#[command(name = "wtw-scrape")]
#[command(about = "Scrape product data from H&M, Pinterest and Zalando")]
struct Args {
    /// File with one URL per line; blank lines and # comments are skipped
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Force an adapter instead of detecting it from the host
    #[arg(long = "site")]
    site: Option<Site>,

    /// H&M locale (default de_at)
    #[arg(long = "locale")]
    locale: Option<String>,

    /// Print a human readable listing instead of JSON
    #[arg(long = "text")]
    text: bool,

    /// Print per-site cache statistics to stderr at exit
    #[arg(long = "stats")]
    stats: bool,

    /// Proxy for every request, e.g. socks5h://tor:9050
    #[arg(long = "proxy", env = "PROXY_URL")]
    proxy: Option<String>,

    /// Tor control host; enables NEWNYM after blocks
    #[arg(long = "tor-control-host", env = "TOR_CONTROL_HOST")]
    tor_control_host: Option<String>,

    #[arg(long = "tor-control-port", env = "TOR_CONTROL_PORT", default_value_t = 9051)]
    tor_control_port: u16,

    #[arg(long = "tor-control-password", env = "TOR_CONTROL_PASSWORD", default_value = "")]
    tor_control_password: String,

    /// Log filter directive
    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// URLs to scrape
    #[arg()]
    urls: Vec<String>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Read URLs from a file, one per line.
fn read_url_file(path: &Path) -> std::io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn format_output(records: &[ScrapedRecord], text: bool) -> serde_json::Result<String> {
    if text {
        return Ok(records
            .iter()
            .map(ScrapedRecord::format_text)
            .collect::<Vec<_>>()
            .join("\n\n"));
    }
    if records.len() == 1 {
        serde_json::to_string_pretty(&records[0])
    } else {
        serde_json::to_string_pretty(records)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut urls = args.urls.clone();
    if let Some(input) = &args.input {
        match read_url_file(input) {
            Ok(lines) => urls.extend(lines),
            Err(e) => {
                eprintln!("error reading file {:?}: {}", input, e);
                return ExitCode::from(1);
            }
        }
    }

    if urls.is_empty() {
        eprintln!("error: at least one URL is required, or use --input");
        return ExitCode::from(1);
    }

    let mut builder = Client::builder();
    if let Some(proxy) = &args.proxy {
        builder = builder.proxy(proxy.clone());
    }
    if let Some(host) = &args.tor_control_host {
        builder = builder.tor_control(TorControlConfig {
            host: host.clone(),
            port: args.tor_control_port,
            password: args.tor_control_password.clone(),
        });
    }
    let client = builder.build();

    let mut records = Vec::new();
    let mut had_error = false;

    for url in &urls {
        let result = match args.site {
            Some(site) => client.scrape_site(site, url, args.locale.as_deref()).await,
            None => client.scrape(url, args.locale.as_deref()).await,
        };
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                eprintln!("error scraping {}: {}", url, e);
                had_error = true;
            }
        }
    }

    if !records.is_empty() {
        match format_output(&records, args.text) {
            Ok(output) => println!("{}", output),
            Err(e) => {
                eprintln!("error formatting output: {}", e);
                had_error = true;
            }
        }
    }

    if args.stats {
        match serde_json::to_string_pretty(&client.stats()) {
            Ok(stats) => eprintln!("{}", stats),
            Err(e) => eprintln!("error formatting stats: {}", e),
        }
    }

    if had_error {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
