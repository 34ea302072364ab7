use clap::Parser;
use log::{error, info};
use server::network::Server;
use server::session::SessionConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Round duration in seconds when the game master does not choose one
    #[arg(short, long, env = "TRIVIA_TIME_LIMIT", default_value = "60")]
    time_limit: u32,

    /// Maximum number of simultaneous connections
    #[arg(short, long, default_value = "64")]
    max_clients: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let config = SessionConfig {
        default_time_limit: args.time_limit.max(1),
    };

    info!("Starting trivia server on {}", address);
    info!(
        "Default round time: {}s, max clients: {}",
        config.default_time_limit, args.max_clients
    );

    let mut server = Server::new(&address, config, args.max_clients).await?;
    let handle = server.handle();

    let running = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {}", e);
        }
    });

    tokio::select! {
        result = running => {
            if let Err(e) = result {
                error!("Server task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    }

    Ok(())
}
