//! # Terminal Example
//!
//! Plays Feed the Gopher from a terminal:
//!
//! 1. Ask for a display name
//! 2. Open the chat channel and start polling the leaderboard
//! 3. Turn typed lines into chat messages, clicks and auto-feeder builds
//! 4. Shut down on Ctrl+C or end of input
//!
//! ## Running
//!
//! ```sh
//! # Start a Feed the Gopher server on localhost:8080, then:
//! cargo run --example terminal
//!
//! # Point at another server:
//! GOPHER_BASE_URL=http://my-server:8080 cargo run --example terminal
//! ```
//!
//! ## Commands
//!
//! | Input        | Effect                                   |
//! |--------------|------------------------------------------|
//! | `/click`     | Feed the gopher once                     |
//! | `/build <n>` | Buy an auto-feeder of tier `n` (1, 2, 3) |
//! | `/board`     | Print the last leaderboard again         |
//! | anything     | Send it as a chat message                |

use std::io::BufRead;

use feed_the_gopher_client::sink::{dispatch, RATE_LIMIT_NOTICE};
use feed_the_gopher_client::{
    acquire_identity, ActionKind, AutoFeederKind, ClientConfig, ConnectionState, LinePrompt,
    PresentationSink, ScoreEntry, Session,
};
use tokio::sync::mpsc;

/// Prints everything straight to stdout.
#[derive(Default)]
struct TerminalSink {
    board: Vec<ScoreEntry>,
}

impl TerminalSink {
    fn print_board(&self) {
        if self.board.is_empty() {
            println!("(leaderboard is empty)");
            return;
        }
        println!("── top scorers ──");
        for entry in &self.board {
            println!("{entry}");
        }
    }
}

impl PresentationSink for TerminalSink {
    fn on_chat_fragment(&mut self, html: &str) {
        println!("{html}");
    }

    fn on_leaderboard_snapshot(&mut self, entries: &[ScoreEntry]) {
        // Only redraw when something changed, the poll runs every second.
        if self.board != entries {
            self.board = entries.to_vec();
            self.print_board();
        }
    }

    fn on_rate_limited(&mut self, action: ActionKind) {
        tracing::debug!(%action, "rate limited");
        println!("{RATE_LIMIT_NOTICE}");
    }

    fn on_connection_state(&mut self, state: ConnectionState) {
        tracing::info!("chat channel {state}");
    }
}

/// What one typed line asks for.
enum Command {
    Click,
    Build(AutoFeederKind),
    Board,
    Chat(String),
    Invalid(String),
}

fn parse_command(line: &str) -> Command {
    let trimmed = line.trim_end();
    match trimmed {
        "/click" => return Command::Click,
        "/board" => return Command::Board,
        _ => {}
    }
    let Some(arg) = trimmed.strip_prefix("/build ") else {
        return Command::Chat(line.to_string());
    };
    match arg.trim().parse::<u8>() {
        Ok(tier) => AutoFeederKind::try_from(tier).map_or_else(Command::Invalid, Command::Build),
        Err(_) => Command::Invalid(format!("not a tier number: {arg}")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Identity ────────────────────────────────────────────────────
    let identity = tokio::task::spawn_blocking(|| {
        let mut prompt = LinePrompt::new(std::io::stdin().lock(), std::io::stdout());
        acquire_identity(&mut prompt)
    })
    .await??;

    // ── Session ─────────────────────────────────────────────────────
    let config = ClientConfig::from_env()?;
    tracing::info!("Playing as {identity} on {}", config.base_url);
    let (mut session, mut events) = Session::connect(identity, &config)?;

    println!("Feeders:");
    for kind in AutoFeederKind::ALL {
        println!(
            "  /build {}  costs {:>9}, earns {:>3}/min",
            kind.tier(),
            kind.cost(),
            kind.income_per_minute()
        );
    }

    // Read through std's stdin buffer, it may still hold input typed
    // during the name prompt.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    // ── Event loop ──────────────────────────────────────────────────
    let mut sink = TerminalSink::default();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };
                dispatch(&event, &mut sink);
            }

            line = line_rx.recv() => {
                let Some(line) = line else {
                    tracing::info!("End of input, exiting");
                    break;
                };
                match parse_command(&line) {
                    Command::Click => session.user_requests_click(),
                    Command::Build(kind) => session.user_requests_build(kind),
                    Command::Board => sink.print_board(),
                    Command::Chat(text) => session.user_requests_send(&text),
                    Command::Invalid(reason) => println!("{reason}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
