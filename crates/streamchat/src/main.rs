//! A terminal chat demonstrating how to use `streamchat` as a library.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use streamchat::ChatBuilder;
use streamchat::core::SessionHandle;
use streamchat::model::StreamState;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::signal::ctrl_c;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let chat = match ChatBuilder::from_env() {
        Ok(builder) => builder.build(),
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .map(|style| style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = select! {
            line = read_line(&mut lines) => line,
            _ = ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let Ok(handle) = chat.send(&line) else {
            continue;
        };
        print_reply(handle, &progress_style).await;
        if let Some(reply) = chat.history().last() {
            debug!("reply has {} bytes", reply.content.len());
        }
    }
}

/// Prints the reply as it streams in. Ctrl-C stops the generation.
async fn print_reply(mut handle: SessionHandle, progress_style: &ProgressStyle) {
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(progress_style.clone());
    progress_bar.set_message("🤔 Thinking...");

    let bar = BAR_CHAR.bright_cyan();
    let mut printed = 0;
    loop {
        let tick = sleep(Duration::from_millis(100));
        select! {
            event = handle.updates().recv() => {
                let Some(event) = event else {
                    break;
                };
                if printed == 0 {
                    // Finish the progress bar before printing anything else.
                    progress_bar.finish_and_clear();
                    print!("{bar}🤖 ");
                }
                let delta = &event.content[printed..];
                print!("{}", delta.bright_white());
                std::io::stdout().flush().ok();
                printed = event.content.len();
            }
            _ = ctrl_c() => {
                handle.cancel();
            }
            _ = tick => {
                progress_bar.inc(1);
            }
        }
    }
    progress_bar.finish_and_clear();

    match handle.join().await {
        Ok(StreamState::Aborted) => {
            println!(" {}", "[stopped]".dimmed());
        }
        Ok(_) => {
            println!();
        }
        Err(err) => {
            if printed > 0 {
                println!();
            }
            println!("{}{}", BAR_CHAR.bright_red(), err.bright_red());
        }
    }
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match lines.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {err}");
            None
        }
    }
}
