//! Interactive relay client
//!
//! Connects to a relay server, sends each stdin line as a message and
//! prints whatever the server relays back.
//!
//! Usage: rusty_relay_client [host] [name]

use std::env;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use rusty_relay::constants::{
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PORT, QUIT_SENTINEL, SHUTDOWN_NOTICE,
};
use rusty_relay::core::{encode_frame, FrameReader};

const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
const DEFAULT_NAME: &str = "[Student]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or(DEFAULT_SERVER_HOST.to_string());
    let name = args.next().unwrap_or(DEFAULT_NAME.to_string());
    let port = env::var("RUSTY_RELAY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    println!("Connecting to {}:{} as {}", host, port, name);
    let stream = TcpStream::connect((host.as_str(), port)).await?;
    println!("Connected. Type messages to send them, or '{}' to exit.", QUIT_SENTINEL);

    let (read_half, mut write_half) = stream.into_split();
    let mut frames = FrameReader::new(read_half, DEFAULT_MAX_MESSAGE_SIZE);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    prompt();
    loop {
        tokio::select! {
            received = frames.next_message() => {
                match received {
                    Ok(Some(message)) => {
                        println!("\nSERVER: {}", message.content);
                        if message.content == SHUTDOWN_NOTICE {
                            break;
                        }
                        prompt();
                    }
                    Ok(None) => {
                        println!("\nConnection closed by server");
                        break;
                    }
                    Err(e) => {
                        println!("\nConnection error: {}", e);
                        break;
                    }
                }
            }
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let input = line.trim_end();

                let outgoing = if input == QUIT_SENTINEL {
                    input.to_string()
                } else {
                    format!("{} : {}", name, input)
                };
                write_half
                    .write_all(&encode_frame(truncate(&outgoing, DEFAULT_MAX_MESSAGE_SIZE - 1)))
                    .await?;

                if input == QUIT_SENTINEL {
                    break;
                }
                prompt();
            }
        }
    }

    write_half.shutdown().await.ok();
    Ok(())
}

fn prompt() {
    print!("Enter input (up to {} characters): ", DEFAULT_MAX_MESSAGE_SIZE);
    io::stdout().flush().ok();
}

// Cut to at most `max` bytes without splitting a character
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
