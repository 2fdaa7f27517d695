use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Management CLI for the certificate relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "RELAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the target, cached identities and breaker states
    Status,
    /// Drop every cached certificate and bound client
    Reset,
    /// Drop one identity's certificate and bound client
    Forget { identity: String },
    /// Clear the configured target, optionally switching base domain
    Reconfigure {
        #[arg(long)]
        base_domain: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{base}/admin/status"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Reset => {
            client
                .post(format!("{base}/admin/certificates/reset"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Forget { identity } => {
            client
                .delete(format!("{base}/admin/certificates/{identity}"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Reconfigure { base_domain } => {
            client
                .post(format!("{base}/admin/client/reset"))
                .headers(headers)
                .json(&serde_json::json!({ "base_domain": base_domain }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.trim().is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
