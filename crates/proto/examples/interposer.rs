//! Warden Interposer Example
//!
//! This example demonstrates how to:
//! - Accept a client's SSH connection and dial the target server
//! - Enforce a per-(client, service) policy with an interactive prompt
//! - Hand the client off to key-exchange directly with the server
//!
//! Usage:
//!   cargo run --example interposer <listen_addr> <server_addr> <server_user> <command> [policy_file]
//!
//! Example:
//!   cargo run --example interposer 127.0.0.1:2200 srv.example.com:22 bob "ls -la" ~/.warden/policy.json
//!
//! Then point a client at 127.0.0.1:2200. Connections are served one at a
//! time; each may run exactly the announced command.

use std::env;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use warden_proto::interpose::{connection_scope, serve_connection};
use warden_proto::policy::PolicyStore;
use warden_proto::prompt::terminal_prompt;
use warden_proto::ssh::auth::{AuthMethod, ClientConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        eprintln!(
            "Usage: {} <listen_addr> <server_addr> <server_user> <command> [policy_file]",
            args[0]
        );
        std::process::exit(1);
    }

    let listen_addr = &args[1];
    let server_addr = args[2].clone();
    let server_user = args[3].clone();
    let command = args[4].clone();

    let store = Arc::new(match args.get(5) {
        Some(path) => PolicyStore::load(path.clone())?,
        None => PolicyStore::in_memory(),
    });

    let password = dialoguer::Password::new()
        .with_prompt(format!("Password for {}@{}", server_user, server_addr))
        .interact()?;

    let client_username = env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    let prompt = terminal_prompt();

    let listener = TcpListener::bind(listen_addr).await?;
    println!("Warden interposer listening on {}", listen_addr);
    println!("  target:  {}@{}", server_user, server_addr);
    println!("  command: {}", command);

    loop {
        let (client_stream, peer_addr) = listener.accept().await?;
        println!("Connection from {}", peer_addr);

        let server_stream = match TcpStream::connect(&server_addr).await {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("Failed to dial {}: {}", server_addr, e);
                continue;
            }
        };

        let scope = connection_scope(&client_username, &peer_addr, &server_user, &server_addr);
        let client_config = ClientConfig {
            username: server_user.clone(),
            auth: AuthMethod::Password(password.clone()),
        };

        match serve_connection(
            client_stream,
            server_stream,
            &server_addr,
            scope,
            client_config,
            &command,
            Arc::clone(&store),
            Arc::clone(&prompt),
        )
        .await
        {
            Ok(()) => println!("Connection from {} handed off cleanly", peer_addr),
            Err(e) => eprintln!("Connection from {} ended: {}", peer_addr, e),
        }
    }
}
