use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-ctl")]
#[command(about = "Inspect a running failover proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8089")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Liveness, active upstream and counters
    Health,
    /// Full failover state including rate-limit timestamps and cooldown
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    // Talking to a local proxy; never route through HTTP(S)_PROXY.
    let client = reqwest::Client::builder().no_proxy().build()?;

    let path = match cli.command {
        Commands::Health => "/health",
        Commands::Status => "/brain-status",
    };
    let url = format!("{}{}", cli.url.trim_end_matches('/'), path);

    let res = client.get(url).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if status.is_success() {
        let json: Value = res.json().await?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("Error: {} - {}", status, res.text().await?);
    }
    Ok(())
}
