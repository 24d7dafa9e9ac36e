use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use convoroom_config::load as load_config;
use convoroom_rooms::{NullStore, ResponseGenerator, RoomEvent, RoomMessage};
use convoroom_runtime::{telemetry, CoreServices};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "convoroom-backend")]
#[command(about = "Convoroom backend (console by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive console (default)
    Console,
    /// Print the effective configuration and exit
    ShowConfig,
}

/// Stand-in responder used until a real model collaborator is wired in.
/// Echoes the most recent user message back into the room.
struct EchoResponder;

#[async_trait]
impl ResponseGenerator for EchoResponder {
    async fn generate(&self, _room_id: &str, context: &[RoomMessage]) -> anyhow::Result<String> {
        let last = context
            .iter()
            .rev()
            .find(|message| !message.sender.is_assistant());
        Ok(match last {
            Some(message) => format!("(echo) {}", message.content),
            None => "(echo) nothing to respond to yet".to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Console) {
        Commands::Console => run_console().await,
        Commands::ShowConfig => show_config(),
    }
}

fn show_config() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

struct Session {
    connection_id: Uuid,
}

async fn run_console() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;
    let services = CoreServices::initialise(&config, Arc::new(NullStore), Arc::new(EchoResponder));

    println!("Convoroom Interactive Console");
    println!("Type '/help' for commands, '/quit' to exit");
    println!("---");

    let mut sessions: HashMap<String, Session> = HashMap::new();

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        print!("> ");
        std::io::Write::flush(&mut std::io::stdout())?;

        line.clear();
        tokio::select! {
            read = reader.read_line(&mut line) => {
                if read? == 0 {
                    break; // EOF
                }
            }
            _ = convoroom_runtime::shutdown_signal() => {
                println!();
                break;
            }
        }

        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let args: Vec<&str> = parts.collect();

        match command {
            "/quit" | "/exit" | "/q" => {
                println!("Goodbye!");
                break;
            }
            "/help" | "/h" => {
                println!("Available commands:");
                println!("  /help, /h                     - Show this help");
                println!("  /rooms, /r                    - List live rooms");
                println!("  /create [id] [capacity]       - Create a room");
                println!("  /join <room> <user>           - Join a room as a user");
                println!("  /leave <room> <user>          - Leave a room");
                println!("  /say <room> <user> <text...>  - Publish a message");
                println!("  /ai <room>                    - Request an assistant response");
                println!("  /history <room> [limit]       - Show recent messages");
                println!("  /close <room>                 - Close a room");
                println!("  /quit, /exit, /q              - Exit console");
            }
            "/rooms" | "/r" => {
                let rooms = services.rooms.rooms().await;
                if rooms.is_empty() {
                    println!("No live rooms");
                } else {
                    for room in rooms {
                        println!(
                            "  {}: {}/{} members ({})",
                            room.id,
                            room.active_members,
                            room.capacity,
                            room.phase.as_str()
                        );
                    }
                }
            }
            "/create" => {
                let id = args.first().map(|s| s.to_string());
                let capacity = args.get(1).and_then(|s| s.parse().ok());
                match services.rooms.create_room(id, capacity).await {
                    Ok(room) => println!("Created room {} (capacity {})", room.id, room.capacity),
                    Err(error) => println!("Error: {error}"),
                }
            }
            "/join" => {
                let (Some(&room), Some(&user)) = (args.first(), args.get(1)) else {
                    println!("Usage: /join <room> <user>");
                    continue;
                };
                match services.rooms.join_room(room, user).await {
                    Ok(joined) => {
                        for message in &joined.backlog {
                            println!("  [backlog] {}: {}", message.sender, message.content);
                        }
                        sessions.insert(
                            session_key(room, user),
                            Session {
                                connection_id: joined.connection_id,
                            },
                        );
                        spawn_printer(room, user, joined.events);
                        println!("{user} joined {room}");
                    }
                    Err(error) => println!("Error: {error}"),
                }
            }
            "/leave" => {
                let (Some(&room), Some(&user)) = (args.first(), args.get(1)) else {
                    println!("Usage: /leave <room> <user>");
                    continue;
                };
                match sessions.remove(&session_key(room, user)) {
                    Some(session) => match services.rooms.leave_room(session.connection_id).await {
                        Ok(()) => println!("{user} left {room}"),
                        Err(error) => println!("Error: {error}"),
                    },
                    None => println!("{user} is not joined to {room} from this console"),
                }
            }
            "/say" => {
                let (Some(&room), Some(&user)) = (args.first(), args.get(1)) else {
                    println!("Usage: /say <room> <user> <text...>");
                    continue;
                };
                let text = args[2..].join(" ");
                if text.is_empty() {
                    println!("Usage: /say <room> <user> <text...>");
                    continue;
                }
                match services.rooms.publish_message(room, user, &text).await {
                    Ok(receipt) => println!("delivered to {} connection(s)", receipt.delivered),
                    Err(error) => println!("Error: {error}"),
                }
            }
            "/ai" => {
                let Some(&room) = args.first() else {
                    println!("Usage: /ai <room>");
                    continue;
                };
                match services.rooms.request_response(room).await {
                    Ok(receipt) => {
                        println!("assistant replied, delivered to {} connection(s)", receipt.delivered)
                    }
                    Err(error) => println!("Error: {error}"),
                }
            }
            "/history" => {
                let Some(&room) = args.first() else {
                    println!("Usage: /history <room> [limit]");
                    continue;
                };
                let limit = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(20);
                match services.rooms.get_recent_history(room, limit).await {
                    Ok(messages) if messages.is_empty() => println!("No messages"),
                    Ok(messages) => {
                        for message in messages {
                            println!(
                                "  #{} {}: {}",
                                message.seq, message.sender, message.content
                            );
                        }
                    }
                    Err(error) => println!("Error: {error}"),
                }
            }
            "/close" => {
                let Some(&room) = args.first() else {
                    println!("Usage: /close <room>");
                    continue;
                };
                match services.rooms.close_room(room).await {
                    Ok(()) => {
                        sessions.retain(|key, _| !key.starts_with(&format!("{room}/")));
                        println!("Room {room} closed");
                    }
                    Err(error) => println!("Error: {error}"),
                }
            }
            _ => {
                println!("Unknown command: {command}");
                println!("Type '/help' for available commands");
            }
        }
    }

    Ok(())
}

fn session_key(room: &str, user: &str) -> String {
    format!("{room}/{user}")
}

fn spawn_printer(room: &str, user: &str, mut events: tokio::sync::mpsc::Receiver<RoomEvent>) {
    let label = format!("{user}@{room}");
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RoomEvent::Message { message, .. } => {
                    println!("[{label}] {}: {}", message.sender, message.content);
                }
                RoomEvent::MemberJoined { user_id, .. } => {
                    println!("[{label}] * {user_id} joined");
                }
                RoomEvent::MemberLeft { user_id, .. } => {
                    println!("[{label}] * {user_id} left");
                }
                RoomEvent::RoomClosing { room_id } => {
                    println!("[{label}] * room {room_id} is closing");
                    break;
                }
            }
        }
    });
}
