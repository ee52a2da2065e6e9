//! Command-line interface and REPL
//!
//! A thin presentation layer over the `Orchestrator`. Every command is parsed
//! into a `Command`, executed, and rendered to a string so the same path is
//! used interactively and in tests.

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::{BpmBucket, Song, SongDraft};
use crate::controller::SendOutcome;
use crate::device::SessionStatus;
use crate::error::CatalogError;
use crate::orchestrator::Orchestrator;

const HELP: &str = "\
Commands:
  list [term]                                   list songs, optionally filtered
  stats                                         catalog statistics
  select <id>                                   select a song on the device
  resync                                        re-send the active song
  add <title> <folder> <program> <bpm> [artist] add a song (quote titles with spaces)
  delete <id>                                   delete a song
  outputs                                       list MIDI outputs
  output <id|none>                              bind or unbind an output
  start | stop | toggle                         transport control
  status                                        device and active song
  quit                                          exit";

/// A parsed REPL command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List(Option<String>),
    Stats,
    Select(String),
    Resync,
    Add {
        title: String,
        folder: i64,
        program: i64,
        bpm: i64,
        artist: Option<String>,
    },
    Delete(String),
    Outputs,
    Output(Option<String>),
    Start,
    Stop,
    Toggle,
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let args = split_args(line)?;
        let Some((name, rest)) = args.split_first() else {
            return Ok(None);
        };

        let command = match (name.as_str(), rest) {
            ("list" | "ls", []) => Command::List(None),
            ("list" | "ls", terms) => Command::List(Some(terms.join(" "))),
            ("stats", []) => Command::Stats,
            ("select" | "sel", [id]) => Command::Select(id.clone()),
            ("resync", []) => Command::Resync,
            ("add", [title, folder, program, bpm, artist @ ..]) if artist.len() <= 1 => {
                Command::Add {
                    title: title.clone(),
                    folder: parse_number("folder", folder)?,
                    program: parse_number("program", program)?,
                    bpm: parse_number("bpm", bpm)?,
                    artist: artist.first().cloned(),
                }
            }
            ("delete" | "rm", [id]) => Command::Delete(id.clone()),
            ("outputs", []) => Command::Outputs,
            ("output", [id]) if id == "none" => Command::Output(None),
            ("output", [id]) => Command::Output(Some(id.clone())),
            ("start", []) => Command::Start,
            ("stop", []) => Command::Stop,
            ("toggle", []) => Command::Toggle,
            ("status", []) => Command::Status,
            ("help" | "?", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            (name, _) => return Err(format!("Unknown command or wrong arguments: {}", name)),
        };
        Ok(Some(command))
    }
}

fn parse_number(field: &str, raw: &str) -> Result<i64, String> {
    raw.parse()
        .map_err(|_| format!("{} must be a whole number, got '{}'", field, raw))
}

/// Split on whitespace, keeping double-quoted runs together
fn split_args(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if in_quotes {
        return Err("Unterminated quote".to_string());
    }
    if has_token {
        args.push(current);
    }
    Ok(args)
}

/// What the loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Print(String),
    Quit,
}

/// Execute a command against the orchestrator and render the result
pub fn execute(orchestrator: &Orchestrator, command: Command) -> Reply {
    let output = match command {
        Command::List(term) => {
            let songs = match term.as_deref() {
                Some(term) => orchestrator.search_songs(term),
                None => orchestrator.list_songs(),
            };
            render_songs(&songs, orchestrator.active_song().as_ref())
        }
        Command::Stats => {
            let stats = orchestrator.stats();
            let mut out = format!(
                "{}\n  Songs:       {}\n  Average BPM: {}\n",
                "Catalog".bold(),
                stats.total.to_string().green(),
                stats.average_bpm.to_string().green(),
            );
            if let Some(last) = stats.last_added.and_then(DateTime::<Utc>::from_timestamp_millis) {
                out.push_str(&format!("  Last added:  {}\n", last.format("%Y-%m-%d %H:%M")));
            }
            for bucket in BpmBucket::all() {
                out.push_str(&format!(
                    "  {:<16} {}\n",
                    bucket.label(),
                    stats.bucket_count(*bucket)
                ));
            }
            out
        }
        Command::Select(id) => match orchestrator.select_song(&id) {
            Ok(outcome) => format!(
                "🎵 {} {}",
                outcome.song.display_title().bold(),
                render_outcome(&outcome.midi)
            ),
            Err(e) => render_error(&e),
        },
        Command::Resync => match orchestrator.resync() {
            Some(outcome) => format!("Resync {}", render_outcome(&outcome)),
            None => "No active song".dimmed().to_string(),
        },
        Command::Add {
            title,
            folder,
            program,
            bpm,
            artist,
        } => {
            let mut draft = SongDraft::new(title).routing(folder, program).bpm(bpm);
            if let Some(artist) = artist {
                draft = draft.artist(artist);
            }
            match orchestrator.save_song(draft) {
                Ok(song) => format!("Saved '{}' as {}", song.title, song.id.cyan()),
                Err(e) => render_error(&e),
            }
        }
        Command::Delete(id) => match orchestrator.delete_song(&id) {
            Ok(()) => format!("Deleted {}", id),
            Err(e) => render_error(&e),
        },
        Command::Outputs => {
            let outputs = orchestrator.outputs();
            if outputs.is_empty() {
                "No output ports found".dimmed().to_string()
            } else {
                let bound = orchestrator.controller().session().bound_output();
                outputs
                    .iter()
                    .map(|o| {
                        let marker = if bound.as_ref().is_some_and(|b| b.id == o.id) {
                            "*".green()
                        } else {
                            " ".normal()
                        };
                        format!("{} {}  {}", marker, o.id.yellow(), o.name)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Output(id) => render_status(&orchestrator.set_output_device(id.as_deref())),
        Command::Start => format!("Start {}", render_outcome(&orchestrator.controller().start())),
        Command::Stop => format!("Stop {}", render_outcome(&orchestrator.controller().stop())),
        Command::Toggle => {
            let (state, outcome) = orchestrator.toggle_transport();
            format!("Transport {:?} {}", state, render_outcome(&outcome))
        }
        Command::Status => {
            let active = orchestrator
                .active_song()
                .map(|s| s.display_title())
                .unwrap_or_else(|| "none".to_string());
            format!(
                "Device:    {}\nTransport: {:?}\nActive:    {}",
                render_status(&orchestrator.device_status()),
                orchestrator.controller().transport_state(),
                active
            )
        }
        Command::Help => HELP.to_string(),
        Command::Quit => return Reply::Quit,
    };
    Reply::Print(output)
}

fn render_songs(songs: &[Song], active: Option<&Song>) -> String {
    if songs.is_empty() {
        return "No songs found".dimmed().to_string();
    }
    songs
        .iter()
        .map(|song| {
            let marker = if active.is_some_and(|a| a.id == song.id) {
                "▶".green()
            } else {
                " ".normal()
            };
            format!(
                "{} {:>14}  {:<32} F{:<3} P{:<3} {} BPM",
                marker,
                song.id.yellow(),
                song.display_title(),
                song.folder,
                song.program,
                song.bpm
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_outcome(outcome: &SendOutcome) -> ColoredString {
    if outcome.is_simulated() {
        "(simulated, no output bound)".yellow()
    } else {
        "(sent)".green()
    }
}

/// Bad input is a warning, anything else is a storage fault
fn render_error(error: &CatalogError) -> String {
    if error.is_rejection() {
        error.to_string().yellow().to_string()
    } else {
        format!("{} {}", "error:".red().bold(), error)
    }
}

fn render_status(status: &SessionStatus) -> String {
    match status {
        SessionStatus::Unavailable => "MIDI unavailable".red().to_string(),
        SessionStatus::NoOutputs => "no outputs found".yellow().to_string(),
        SessionStatus::Unbound => "no output selected".yellow().to_string(),
        SessionStatus::Bound { name, .. } => format!("bound to {}", name.green()),
    }
}

/// Run the interactive loop until `quit` or end of input
///
/// Blocking; call from a blocking thread.
pub fn run_repl(orchestrator: Arc<Orchestrator>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    let remote = orchestrator.on_remote_song_change(|song| {
        println!("\n{} {}", "Remote selection:".cyan(), song.display_title());
    });

    println!("{}", "Setlist Sync - type 'help' for commands".bold().cyan());

    loop {
        let readline = rl.readline("setlist> ");
        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match Command::parse(&line) {
                    Ok(Some(command)) => {
                        debug!("REPL command: {:?}", command);
                        match execute(&orchestrator, command) {
                            Reply::Print(output) => println!("{}", output),
                            Reply::Quit => break,
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{}", message.red()),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                orchestrator.remove_remote_listener(remote);
                return Err(e.into());
            }
        }
    }

    orchestrator.remove_remote_listener(remote);
    Ok(())
}
