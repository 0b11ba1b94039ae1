#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use cxpc::config::{ClientConfig, Cli};
use cxpc::{CampusClient, ClientError, Event, InboundMsg};
use std::io::IsTerminal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";

fn tty() -> bool {
    std::io::stdout().is_terminal()
}

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send {
        target: String,
        dept: String,
        body: String,
    },
    Inbox,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    match line {
        "/inbox" => return Ok(Command::Inbox),
        "/help" => return Ok(Command::Help),
        "/quit" | "/exit" => return Ok(Command::Quit),
        _ => {}
    }

    let mut parts = line.splitn(3, char::is_whitespace);
    let (Some(target), Some(dept), Some(body)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err("usage: <campus> <department> <message>".to_string());
    };
    let body = body.trim_start();
    if target.is_empty() || body.is_empty() {
        return Err("usage: <campus> <department> <message>".to_string());
    }
    if let Some(c) = [target, dept]
        .iter()
        .flat_map(|s| s.chars())
        .find(|c| matches!(c, '|' | ':'))
    {
        return Err(format!("campus and department must not contain '{c}'"));
    }
    Ok(Command::Send {
        target: target.to_string(),
        dept: dept.to_string(),
        body: body.to_string(),
    })
}

fn print_help() {
    println!("  <campus> <department> <message>   send a message");
    println!("  /inbox                            show received messages");
    println!("  /quit                             disconnect");
}

fn print_inbox(inbox: &[InboundMsg]) {
    if inbox.is_empty() {
        println!("  {DIM}no messages{RESET}");
        return;
    }
    for (i, msg) in inbox.iter().enumerate() {
        println!(
            "  {BOLD}#{}{RESET} {DIM}{}{RESET}",
            i + 1,
            msg.received_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("  From: {}", msg.from);
        println!("  To: {}", msg.dept);
        println!("  Message: {}", msg.body);
    }
}

/// Print an event; returns `false` once the relay connection is gone.
fn show_event(event: Event, inbox: &mut Vec<InboundMsg>) -> bool {
    let color = tty();
    match event {
        Event::Message(msg) => {
            if color {
                println!("{GREEN}{BOLD}*** New message from {} ***{RESET}", msg.from);
            } else {
                println!("message from {}: {}", msg.from, msg.body);
            }
            inbox.push(msg);
        }
        Event::Delivered(notice) => {
            if color {
                println!("  {GREEN}\u{2713}{RESET} {notice}");
            } else {
                println!("{notice}");
            }
        }
        Event::Undeliverable(notice) => {
            if color {
                println!("  {RED}\u{2717}{RESET} {notice}");
            } else {
                println!("ERROR - {notice}");
            }
        }
        Event::Announcement(text) => {
            if color {
                println!("{MAGENTA}{BOLD}*** SYSTEM ANNOUNCEMENT ***{RESET}");
                println!("{YELLOW}{text}{RESET}");
            } else {
                println!("announcement: {text}");
            }
        }
        Event::Disconnected => {
            println!("disconnected from relay");
            return false;
        }
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config: ClientConfig = cli.into();
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let (mut client, mut events) = match CampusClient::connect(&config).await {
        Ok(connected) => connected,
        Err(ClientError::AuthFailed) => {
            anyhow::bail!("authentication failed: invalid campus name or password")
        }
        Err(ClientError::AlreadyConnected) => {
            anyhow::bail!("campus {} is already connected", config.campus)
        }
        Err(e) => return Err(e.into()),
    };

    if tty() {
        println!(
            "  {GREEN}\u{2713}{RESET} Logged in as {BOLD}{}{RESET} {DIM}(udp port {}){RESET}",
            client.campus(),
            client.udp_port()
        );
        print_help();
    }

    let mut inbox = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if !show_event(event, &mut inbox) {
                    break;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Send { target, dept, body }) => {
                        client.send(&target, &dept, &body).await?;
                    }
                    Ok(Command::Inbox) => print_inbox(&inbox),
                    Ok(Command::Help) => print_help(),
                    Ok(Command::Quit) => break,
                    Err(usage) => eprintln!("{usage}"),
                }
            }
        }
    }

    client.close().await;
    Ok(())
}
