use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "probe-cli")]
#[command(about = "Management CLI for the payment probe agent", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:9090")]
    url: String,

    /// Access token; omit when the agent runs without one.
    #[arg(short, long, env = "PROBE_ACCESS_TOKEN", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scheduler state, last run counters and recent failures
    Status,
    /// Page through recorded attempts, newest first
    Logs {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Only show failed attempts
        #[arg(long)]
        failed_only: bool,
    },
    /// Start a batch now
    ForceRun,
    /// Print the Prometheus exposition
    Metrics,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if !cli.key.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
        );
    }

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/status", base))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Logs { offset, limit, failed_only } => {
            let res = client.get(format!("{}/logs", base))
                .query(&[
                    ("offset", offset.to_string()),
                    ("limit", limit.to_string()),
                    ("failed_only", failed_only.to_string()),
                ])
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ForceRun => {
            let res = client.post(format!("{}/force-run", base))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Metrics => {
            let res = client.get(format!("{}/metrics", base))
                .headers(headers)
                .send()
                .await?;
            let status = res.status();
            let text = res.text().await?;
            if status.is_success() {
                print!("{}", text);
            } else {
                eprintln!("Error: agent returned status {}", status);
                eprintln!("Response: {}", text);
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: agent returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
