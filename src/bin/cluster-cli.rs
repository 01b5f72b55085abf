use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "cluster-cli")]
#[command(about = "Management CLI for the replica-proxy admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "REPLICA_PROXY_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check supervisor status
    Status,
    /// List clusters with live and deactivated replicas
    Clusters,
    /// Show one cluster
    Cluster { name: String },
    /// Run a health probe against a replica
    Probe { cluster: String, replica: String },
    /// Deactivate a replica (cannot be undone)
    Deactivate { cluster: String, replica: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Clusters => client.get(format!("{}/admin/clusters", cli.url)),
        Commands::Cluster { name } => client.get(format!("{}/admin/clusters/{}", cli.url, name)),
        Commands::Probe { cluster, replica } => client.post(format!(
            "{}/admin/clusters/{}/replicas/{}/probe",
            cli.url, cluster, replica
        )),
        Commands::Deactivate { cluster, replica } => client.post(format!(
            "{}/admin/clusters/{}/replicas/{}/deactivate",
            cli.url, cluster, replica
        )),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
