mod config;
mod logging;
mod view;

use std::process::ExitCode;

use chatlink_core::OutboundMessage;
use chatlink_runtime::{ChannelHandle, spawn_channel};
use config::ConsoleConfig;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, error, info, warn};
use view::{ConsoleView, render_message};

const HELP: &str = "type a message and press enter; /start, /stop, /history, /quit";

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    info!("starting chatlink-console");

    let config = match ConsoleConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(
        kind = %config.target.kind(),
        mock = config.channel.mock,
        "console config loaded"
    );

    let channel = match spawn_channel(config.target, config.channel) {
        Ok(channel) => channel,
        Err(err) => {
            error!(%err, "failed to create channel");
            return ExitCode::FAILURE;
        }
    };
    let mut events = channel.subscribe();
    if let Err(err) = channel.start().await {
        error!(%err, "failed to start channel");
        return ExitCode::FAILURE;
    }
    println!("{HELP}");

    let mut view = ConsoleView::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    for line in view.handle_event(event) {
                        println!("{line}");
                    }
                    if view.is_out_of_sync() {
                        view.resync(channel.conversation());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged; resyncing from snapshot");
                    view.resync(channel.conversation());
                }
                Err(RecvError::Closed) => {
                    warn!("channel task ended");
                    break;
                }
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_input(&channel, &view, line.trim()).await {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(err) => {
                    error!(%err, "failed to read stdin");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    if let Err(err) = channel.stop().await {
        warn!(%err, "stop failed during shutdown");
    }
    ExitCode::SUCCESS
}

/// Returns `false` when the console should exit.
async fn handle_input(channel: &ChannelHandle, view: &ConsoleView, input: &str) -> bool {
    match input {
        "" => {}
        "/quit" => return false,
        "/start" => {
            if let Err(err) = channel.start().await {
                println!("[error] {}", err.message);
            }
        }
        "/stop" => {
            if let Err(err) = channel.stop().await {
                println!("[error] {}", err.message);
            }
        }
        "/history" => {
            println!("[status] {}", view.status().text());
            for message in view.messages() {
                println!("{}", render_message(message));
            }
        }
        text => {
            // Sends resolve after the transport write; keep reading events meanwhile.
            let channel = channel.clone();
            let message = OutboundMessage::text(text);
            tokio::spawn(async move {
                if let Err(err) = channel.send(message).await {
                    warn!(code = %err.code, message = %err.message, "send failed");
                }
            });
        }
    }
    true
}
