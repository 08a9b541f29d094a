use admin_ipc::{send_request, AdminRequest, AdminResponse, DEFAULT_SOCKET_PATH};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Status,
    /// Track a product, refreshing every `interval_secs`.
    Register { product_id: i64, interval_secs: u64 },
    Query {
        #[arg(required = true)]
        product_ids: Vec<i64>,
    },
    /// Crawl a product once, now.
    Crawl { product_id: i64 },
    Subscribe { subscriber: String, product_id: i64 },
}

impl Command {
    fn into_request(self) -> AdminRequest {
        match self {
            Command::Status => AdminRequest::Status,
            Command::Register {
                product_id,
                interval_secs,
            } => AdminRequest::Register {
                product_id,
                interval_secs,
            },
            Command::Query { product_ids } => AdminRequest::Query { product_ids },
            Command::Crawl { product_id } => AdminRequest::Crawl { product_id },
            Command::Subscribe {
                subscriber,
                product_id,
            } => AdminRequest::Subscribe {
                subscriber,
                product_id,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let resp = send_request(&cli.socket, &cli.command.into_request()).await?;
    println!("{}", serde_json::to_string(&resp)?);
    if let AdminResponse::Error(message) = resp {
        bail!(message);
    }
    Ok(())
}
