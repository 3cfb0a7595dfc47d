//! `reka chat`: interactive REPL.
//!
//! Each line is one turn against a single long-lived model process. Slash
//! commands manage memory without going through the model.

use std::sync::Arc;

use rk_domain::config::Config;
use rk_domain::InboundMeta;

use crate::bootstrap;
use crate::brain::Brain;

const HISTORY_FILE: &str = ".reka_history";

pub async fn chat(config: Arc<Config>) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;
    let brain = state.brain.clone();

    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(HISTORY_FILE);

    eprintln!("reka interactive chat");
    eprintln!("Commands: /clear, /forget, /search <text>, /memory, /exit (or Ctrl+D)");
    eprintln!("Loading model...");
    if let Err(e) = brain.warm_up().await {
        eprintln!("\x1B[31mmodel failed to load: {e} (will retry on first message)\x1B[0m");
    }
    eprintln!();

    let meta = InboundMeta::for_platform("cli");
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(trimmed).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(&brain, trimmed) {
                        break;
                    }
                    continue;
                }

                let reply = brain.handle_input(trimmed, &meta).await;
                println!("reka> {reply}");
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(HISTORY_FILE).ok();
    brain.shutdown().await;
    eprintln!("Goodbye!");
    Ok(())
}

/// Returns `true` when the REPL should exit.
fn handle_slash_command(brain: &Brain, input: &str) -> bool {
    let (cmd, arg) = match input.split_once(' ') {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (input, ""),
    };

    match cmd {
        "/exit" | "/quit" => return true,
        "/clear" => {
            brain.clear_memory();
            eprintln!("Conversation buffer cleared.");
        }
        "/forget" => match brain.clear_long_term() {
            Ok(()) => eprintln!("Long-term memory cleared."),
            Err(e) => eprintln!("\x1B[31mfailed to clear long-term memory: {e}\x1B[0m"),
        },
        "/memory" => {
            for turn in brain.buffered_turns() {
                eprintln!("  {}: {}", turn.role().label(), turn.content());
            }
        }
        "/search" if arg.is_empty() => eprintln!("Usage: /search <text>"),
        "/search" => {
            let matches = brain.search_long_term(arg);
            if matches.is_empty() {
                eprintln!("No long-term matches for {arg:?}.");
            }
            for turn in matches {
                eprintln!(
                    "  [{}] {}: {}",
                    turn.timestamp().format("%Y-%m-%d %H:%M"),
                    turn.role().label(),
                    turn.content()
                );
            }
        }
        _ => eprintln!("Unknown command: {cmd}"),
    }
    false
}
