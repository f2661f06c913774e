use std::io;

use netclip_sync::{LocalOutcome, SyncError, SyncEvent, SyncHandle};
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::broadcast,
};
use tracing::{debug, info, warn};

use crate::frontend::Frontend;

pub const HELP_TEXT: &str = "\
commands:
  list                 show the clip history
  send                 send the current clipboard now
  send <n>             send history entry n
  copy <n>             put history entry n on the clipboard
  recv                 paste the newest received clip
  autosend on|off      toggle sending copied clips
  autoreceive on|off   toggle applying received clips
  json                 print the history as JSON
  help                 show this text
  quit                 exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    /// Zero-based history index, or the current clipboard when `None`.
    Send(Option<usize>),
    Copy(usize),
    Receive,
    Autosend(bool),
    Autoreceive(bool),
    Json,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command {0:?}, try `help`")]
    Unknown(String),
    #[error("`{0}` needs an entry number")]
    MissingIndex(&'static str),
    #[error("invalid entry number {0:?}, entries are numbered from 1")]
    InvalidIndex(String),
    #[error("expected `on` or `off`, got {0:?}")]
    InvalidToggle(String),
    #[error("unexpected argument {0:?}")]
    UnexpectedArgument(String),
}

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let argument = words.next();
    if let Some(extra) = words.next() {
        return Err(CommandError::UnexpectedArgument(extra.to_owned()));
    }

    let command = match name.to_ascii_lowercase().as_str() {
        "list" | "ls" => no_argument(ConsoleCommand::List, argument)?,
        "send" => ConsoleCommand::Send(argument.map(parse_index).transpose()?),
        "copy" => ConsoleCommand::Copy(parse_index(
            argument.ok_or(CommandError::MissingIndex("copy"))?,
        )?),
        "recv" | "receive" => no_argument(ConsoleCommand::Receive, argument)?,
        "autosend" => ConsoleCommand::Autosend(parse_toggle(argument)?),
        "autoreceive" => ConsoleCommand::Autoreceive(parse_toggle(argument)?),
        "json" => no_argument(ConsoleCommand::Json, argument)?,
        "help" | "?" => no_argument(ConsoleCommand::Help, argument)?,
        "quit" | "exit" => no_argument(ConsoleCommand::Quit, argument)?,
        _ => return Err(CommandError::Unknown(name.to_owned())),
    };
    Ok(Some(command))
}

fn no_argument(
    command: ConsoleCommand,
    argument: Option<&str>,
) -> Result<ConsoleCommand, CommandError> {
    match argument {
        None => Ok(command),
        Some(extra) => Err(CommandError::UnexpectedArgument(extra.to_owned())),
    }
}

fn parse_index(raw: &str) -> Result<usize, CommandError> {
    match raw.parse::<usize>() {
        Ok(number) if number >= 1 => Ok(number - 1),
        _ => Err(CommandError::InvalidIndex(raw.to_owned())),
    }
}

fn parse_toggle(raw: Option<&str>) -> Result<bool, CommandError> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err(CommandError::InvalidToggle(raw.unwrap_or_default().to_owned())),
    }
}

/// Reads commands from `input` and prints notifications to `output` until
/// `quit`, end of input, Ctrl-C, or the engine stopping.
pub async fn run_console<R, W>(
    handle: SyncHandle,
    frontend: &dyn Frontend,
    input: R,
    mut output: W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let width = handle.display_width_limit();
    let mut events = handle.subscribe();
    let mut lines = input.lines();

    match handle.history(width).await {
        Ok(view) => write_block(&mut output, &frontend.render_history(&view)).await?,
        Err(err) => {
            warn!("history unavailable: {}", err);
            return Ok(());
        }
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("console input closed");
                    break;
                };
                let command = match parse_command(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(err) => {
                        write_block(&mut output, &err.to_string()).await?;
                        continue;
                    }
                };
                if command == ConsoleCommand::Quit {
                    break;
                }
                match execute(&handle, frontend, command, width).await {
                    Ok(text) => write_block(&mut output, &text).await?,
                    Err(SyncError::EngineStopped) => break,
                    Err(err) => write_block(&mut output, &err.to_string()).await?,
                }
            }
            event = events.recv() => {
                match event {
                    Ok(SyncEvent::HistoryChanged) if frontend.redraw_on_history_change() => {
                        if let Ok(view) = handle.history(width).await {
                            write_block(&mut output, &frontend.render_history(&view)).await?;
                        }
                    }
                    Ok(event) => {
                        if let Some(text) = frontend.render_event(&event) {
                            write_block(&mut output, &text).await?;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "console fell behind on notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    output.flush().await
}

async fn execute(
    handle: &SyncHandle,
    frontend: &dyn Frontend,
    command: ConsoleCommand,
    width: usize,
) -> Result<String, SyncError> {
    let text = match command {
        ConsoleCommand::List => frontend.render_history(&handle.history(width).await?),
        ConsoleCommand::Send(None) => describe_send(handle.send_now().await?, width),
        ConsoleCommand::Send(Some(index)) => describe_send(handle.send_entry(index).await?, width),
        ConsoleCommand::Copy(index) => {
            format!("copied to clipboard: {}", handle.copy_entry(index).await?.label(width))
        }
        ConsoleCommand::Receive => {
            format!("copied to clipboard: {}", handle.receive_latest().await?.label(width))
        }
        ConsoleCommand::Autosend(enabled) => {
            frontend.render_modes(handle.set_autosend(enabled).await?)
        }
        ConsoleCommand::Autoreceive(enabled) => {
            frontend.render_modes(handle.set_autoreceive(enabled).await?)
        }
        ConsoleCommand::Json => {
            let view = handle.history(width).await?;
            serde_json::to_string_pretty(&view).unwrap_or_else(|err| err.to_string())
        }
        ConsoleCommand::Help => HELP_TEXT.to_owned(),
        ConsoleCommand::Quit => String::new(),
    };
    Ok(text)
}

fn describe_send(outcome: LocalOutcome, width: usize) -> String {
    match outcome {
        LocalOutcome::Sent(value) => format!("sent: {}", value.label(width)),
        LocalOutcome::SendFailed(value) => format!("send failed: {}", value.label(width)),
        LocalOutcome::Refused { error, .. } => format!("not sent: {error}"),
        LocalOutcome::Unavailable => "clipboard has no text to send".to_owned(),
        LocalOutcome::SelfEcho | LocalOutcome::Unchanged | LocalOutcome::Recorded(_) => {
            "nothing sent".to_owned()
        }
    }
}

async fn write_block<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    if !text.ends_with('\n') {
        output.write_all(b"\n").await?;
    }
    output.flush().await
}
