use clap::Parser;
use client::display::format_event;
use client::input::{parse_line, InputAction, HELP_TEXT};
use client::network::Connection;
use log::{error, info};
use shared::ClientCommand;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server WebSocket URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3000")]
    server: String,

    /// Join the game under this name right after connecting
    #[arg(short = 'n', long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let mut connection = Connection::connect(&args.server).await?;
    info!("Connected to {}", args.server);

    if let Some(name) = args.name {
        connection.send(&ClientCommand::Join { name }).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = connection.next_event() => {
                match event? {
                    Some(event) => println!("{}", format_event(&event, connection.client_id())),
                    None => {
                        println!("Server closed the connection");
                        break;
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_line(&line) {
                    Ok(InputAction::Send(command)) => {
                        if let Err(e) = connection.send(&command).await {
                            error!("Failed to send command: {}", e);
                            break;
                        }
                    }
                    Ok(InputAction::Help) => println!("{}", HELP_TEXT),
                    Ok(InputAction::Quit) => break,
                    Ok(InputAction::Nothing) => {}
                    Err(e) => println!("{}", e),
                }
            }
        }
    }

    connection.close().await?;
    Ok(())
}
