//! Interactive loop
//!
//! Reads lines from stdin while applying stream updates as they arrive.
//! Rendering is plain text: deltas are printed as they come in.

use std::io::{self, Write};

use anyhow::Result;
use streamchat_core::{
    default_models, resolve_model, ChatOrchestrator, ChatTransport, StreamOutcome, StreamUpdate,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{self, Command, HELP};

/// Whether the loop keeps going after a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading input
    Continue,
    /// Exit the loop
    Quit,
}

/// Run until `/quit`, end of input, or Ctrl-C while idle
pub async fn run<T>(chat: &mut ChatOrchestrator<T>) -> Result<()>
where
    T: ChatTransport + ?Sized + 'static,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = io::stdout();

    writeln!(out, "Type a message, or /help for commands.")?;
    prompt(&mut out, chat)?;

    loop {
        tokio::select! {
            update = chat.next_update(), if chat.is_streaming() => {
                if let Some(update) = update {
                    render_update(&mut out, &update)?;
                    if matches!(update, StreamUpdate::Finished { .. }) {
                        prompt(&mut out, chat)?;
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("End of input");
                    break;
                };
                let Some(command) = commands::parse(&line) else {
                    prompt(&mut out, chat)?;
                    continue;
                };
                if handle_command(chat, command, &mut out)? == Flow::Quit {
                    break;
                }
                if !chat.is_streaming() {
                    prompt(&mut out, chat)?;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if !chat.cancel() {
                    break;
                }
            }
        }
    }

    // Keep whatever a stream in flight produced so far
    chat.cancel();
    chat.store_mut().flush().await;
    writeln!(out)?;
    Ok(())
}

fn prompt<T>(out: &mut impl Write, chat: &ChatOrchestrator<T>) -> io::Result<()>
where
    T: ChatTransport + ?Sized + 'static,
{
    let model = &chat.store().selected_model().id;
    match chat.store().active_conversation() {
        Some(conversation) => write!(out, "[{model}] {}> ", conversation.title)?,
        None => write!(out, "[{model}]> ")?,
    }
    out.flush()
}

/// Print one stream update
pub fn render_update(out: &mut impl Write, update: &StreamUpdate) -> io::Result<()> {
    match update {
        StreamUpdate::Delta { content, .. } => write!(out, "{content}")?,
        StreamUpdate::Finished { outcome, .. } => match outcome {
            StreamOutcome::Completed => writeln!(out)?,
            StreamOutcome::Errored(message) => {
                writeln!(out, "\n[error: {message}] (/retry to try again)")?;
            }
            StreamOutcome::Cancelled => writeln!(out, "\n[cancelled]")?,
        },
    }
    out.flush()
}

/// Apply one parsed input line
pub fn handle_command<T>(
    chat: &mut ChatOrchestrator<T>,
    command: Command,
    out: &mut impl Write,
) -> io::Result<Flow>
where
    T: ChatTransport + ?Sized + 'static,
{
    let active = chat.store().active_conversation_id();

    match command {
        Command::Send(content) => {
            let started = match active {
                Some(_) => chat.send_message(&content),
                None => chat.send_in_new_conversation(&content),
            };
            if started.is_none() {
                writeln!(out, "Message not sent")?;
            }
        }
        Command::Retry => match active.and_then(|id| chat.retry(id)) {
            Some(_) => {}
            None => writeln!(out, "Nothing to retry")?,
        },
        Command::New => {
            chat.store_mut().create_conversation();
            writeln!(out, "Started a new conversation")?;
        }
        Command::List => {
            let conversations = chat.store().conversations();
            if conversations.is_empty() {
                writeln!(out, "No conversations yet")?;
            }
            for (index, conversation) in conversations.iter().enumerate() {
                let marker = if Some(conversation.id) == active { '*' } else { ' ' };
                writeln!(
                    out,
                    "{marker} {:>2}. {} ({} messages, updated {})",
                    index + 1,
                    conversation.title,
                    conversation.messages.len(),
                    conversation.updated_at.format("%Y-%m-%d %H:%M"),
                )?;
            }
        }
        Command::Switch(n) => {
            let target = chat.store().conversations().get(n - 1).map(|c| c.id);
            match target {
                Some(id) => {
                    chat.store_mut().set_active_conversation(Some(id));
                }
                None => writeln!(out, "No conversation {n}, see /list")?,
            }
        }
        Command::Rename(title) => match active {
            Some(id) => {
                chat.store_mut().rename_conversation(id, title);
            }
            None => writeln!(out, "No active conversation")?,
        },
        Command::Delete => match active {
            Some(id) => {
                chat.delete_conversation(id);
                writeln!(out, "Conversation deleted")?;
            }
            None => writeln!(out, "No active conversation")?,
        },
        Command::Model(id) => {
            let model = resolve_model(&id);
            writeln!(out, "Using {}", model.name)?;
            chat.store_mut().set_selected_model(model);
        }
        Command::Models => {
            let selected = chat.store().selected_model().id.clone();
            for model in default_models() {
                let marker = if model.id == selected { '*' } else { ' ' };
                let description = model.description.as_deref().unwrap_or("");
                writeln!(out, "{marker} {:<15} {:<15} {description}", model.id, model.name)?;
            }
        }
        Command::Help => writeln!(out, "{HELP}")?,
        Command::Quit => return Ok(Flow::Quit),
        Command::Invalid(usage) => writeln!(out, "{usage}")?,
    }

    Ok(Flow::Continue)
}
