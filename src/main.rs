use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quiz_arena::{ServerConfig, ServerState, server};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8081")]
    bind: SocketAddr,

    /// JSON file to load the questions from
    #[arg(short, long, default_value = "data/questions.json")]
    questions: PathBuf,

    /// Credential file; created with a default account if missing
    #[arg(short, long, default_value = "data/users.json")]
    users: PathBuf,

    /// Fixed seed for question selection
    #[arg(long)]
    seed: Option<u64>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig {
        bind_addr: args.bind,
        questions_path: args.questions,
        users_path: args.users,
        rng_seed: args.seed,
        ..ServerConfig::default()
    };

    let state = ServerState::load(config)?;
    server::run(Arc::new(state)).await?;
    Ok(())
}
