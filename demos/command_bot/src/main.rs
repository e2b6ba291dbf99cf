//! Command Bot Demo
//!
//! Wires a [`RelayRuntime`], registers one handler per match category and
//! feeds it updates, either a built-in sample or JSON lines from stdin
//! (standing in for a real transport).
//!
//! # Usage
//!
//! ```bash
//! cargo run --package command-bot
//! cat updates.jsonl | cargo run --package command-bot -- --stdin
//! RELAY_LOGGING__LEVEL=debug cargo run --package command-bot
//! ```

use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use relay::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

const SAMPLE_UPDATES: &[&str] = &[
    r#"{"update_id": 1, "message": {"message_id": 10, "text": "/start",
        "entities": [{"type": "bot_command", "offset": 0, "length": 6}]}}"#,
    r#"{"update_id": 2, "message": {"message_id": 11, "text": "/help me",
        "entities": [{"type": "bot_command", "offset": 0, "length": 5}]}}"#,
    r#"{"update_id": 3, "message": {"message_id": 12, "text": "good morning everyone"}}"#,
    r#"{"update_id": 4, "callback_query": {"id": "q1", "data": "vote:42"}}"#,
    r#"{"update_id": 5, "callback_query": {"id": "q2", "game_short_name": "snake"}}"#,
    r#"{"update_id": 6, "message": {"message_id": 13, "caption": "my #cat again"}}"#,
    r#"{"update_id": 7, "message": {"message_id": 14, "text": "/once",
        "entities": [{"type": "bot_command", "offset": 0, "length": 5}]}}"#,
    r#"{"update_id": 8, "message": {"message_id": 15, "text": "/once",
        "entities": [{"type": "bot_command", "offset": 0, "length": 5}]}}"#,
    r#"{"update_id": 9, "message": {"message_id": 16, "text": "nothing to see"}}"#,
];

#[derive(Debug, Parser)]
#[command(about = "Route bot updates to handlers")]
struct Args {
    /// Configuration file (defaults to relay.toml in the current directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(short, long)]
    profile: Option<String>,

    /// Read JSON updates from stdin, one per line.
    #[arg(long)]
    stdin: bool,
}

// ============================================================================
// Handler Functions
// ============================================================================

async fn start_handler(update: Arc<Update>) {
    info!(update_id = update.update_id, "Welcome! Try /help");
}

async fn help_handler(update: Arc<Update>) {
    let args = update
        .message
        .as_ref()
        .map(|m| m.text.trim_start_matches("/help").trim())
        .unwrap_or_default();
    info!(update_id = update.update_id, args, "Commands: /start /help /once");
}

async fn greeting_handler(update: Arc<Update>) {
    info!(update_id = update.update_id, "Good morning to you too");
}

async fn vote_handler(update: Arc<Update>) -> Result<()> {
    let data = update
        .callback_query
        .as_ref()
        .map(|q| q.data.as_str())
        .unwrap_or_default();
    let choice: u32 = data.trim_start_matches("vote:").parse()?;
    info!(update_id = update.update_id, choice, "Vote recorded");
    Ok(())
}

async fn game_handler(update: Arc<Update>) {
    info!(update_id = update.update_id, "Launching snake");
}

async fn cat_photo_handler(update: Arc<Update>) {
    info!(update_id = update.update_id, "Nice cat");
}

async fn fallback_handler(update: Arc<Update>) {
    warn!(update_id = update.update_id, kind = update.kind(), "No handler for update");
}

fn register_handlers(runtime: &RelayRuntime) {
    let registry = runtime.registry();
    let traced = [middleware::trace("command")];

    registry.register(Category::Command, "start", start_handler, &traced);
    registry.register(Category::Command, "help", help_handler, &traced);
    registry.register(Category::MessageText, "^good (morning|evening)", greeting_handler, &[]);
    registry.register(
        Category::CallbackQueryData,
        Regex::new(r"^vote:\d+$").ok(),
        vote_handler,
        &[],
    );
    registry.register(Category::CallbackQueryGameShortName, "snake", game_handler, &[]);
    registry.register(Category::PhotoCaption, "#cat", cat_photo_handler, &[]);

    // One-shot handler. Concurrent dispatches may both reach it before it
    // unregisters itself, so the flag decides which one acts.
    let reg = Arc::clone(registry);
    let fired = Arc::new(AtomicBool::new(false));
    let once_id: Arc<OnceLock<HandlerId>> = Arc::default();
    let slot = Arc::clone(&once_id);
    let id = registry.register(
        Category::Command,
        "once",
        move |update: Arc<Update>| {
            let reg = Arc::clone(&reg);
            let fired = Arc::clone(&fired);
            let slot = Arc::clone(&slot);
            async move {
                if fired
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!(update_id = update.update_id, "One-shot handler already used");
                    return;
                }
                info!(update_id = update.update_id, "This runs only once");
                if let Some(id) = slot.get() {
                    reg.unregister(id);
                }
            }
        },
        &[],
    );
    let _ = once_id.set(id);

    runtime.set_default_handler(fallback_handler);
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Pushes updates into the runtime and returns how many were accepted.
async fn feed(sender: &UpdateSender, from_stdin: bool) -> Result<u64> {
    let mut sent = 0;

    if from_stdin {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match sender.send_json(&line).await {
                Ok(()) => sent += 1,
                Err(RuntimeError::Decode(e)) => error!(error = %e, "Skipping malformed update"),
                Err(e) => return Err(e.into()),
            }
        }
    } else {
        for raw in SAMPLE_UPDATES {
            sender.send_json(raw).await?;
            sent += 1;
        }
    }

    Ok(sent)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = RelayRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    let runtime = Arc::new(builder.build()?);

    register_handlers(&runtime);

    let shutdown = CancellationToken::new();
    let dispatch = {
        let runtime = Arc::clone(&runtime);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { runtime.run_until(shutdown).await })
    };

    let feeder = {
        let runtime = Arc::clone(&runtime);
        let sender = runtime.sender();
        async move {
            let sent = feed(&sender, args.stdin).await?;
            // Every accepted update either completes or panics.
            loop {
                let stats = runtime.stats();
                if stats.dispatched + stats.panicked >= sent {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            anyhow::Ok(())
        }
    };

    tokio::select! {
        result = feeder => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
    }

    shutdown.cancel();
    dispatch.await??;

    info!(stats = %runtime.stats(), "Done");
    Ok(())
}
