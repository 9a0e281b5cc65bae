//! Command-line argument parsing and interactive prompts.
//!
//! Usage:
//!   labtel [-f[<file>]] [-td] [<host> [<port>]]

use std::io::{self, Write};
use std::path::PathBuf;

use crossterm::event::{read, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

// ── Public types ──────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// Positional host override.
    pub host: Option<String>,
    /// Positional port override.
    pub port: Option<u16>,
    /// Connect to the training sub-system (`-t`).
    pub training: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
}

/// How to choose the config file.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConfigFile {
    /// Use the conventional location if it exists (default).
    #[default]
    Search,
    /// `-f` with no argument: skip the config file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────

/// Parse `std::env::args()`.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(&raw[1..])
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        if let Some(rest) = arg.strip_prefix("-f") {
            args.config = if rest.is_empty() {
                ConfigFile::Skip
            } else {
                ConfigFile::Explicit(PathBuf::from(rest))
            };
        } else if let Some(flags) = arg.strip_prefix('-') {
            if flags.is_empty() {
                return Err("empty flag".to_owned());
            }
            for flag in flags.chars() {
                match flag {
                    't' => args.training = true,
                    'd' => args.debug = true,
                    other => return Err(format!("unknown option -{other}")),
                }
            }
        } else {
            positional.push(arg.to_owned());
        }
        i += 1;
    }

    match positional.as_slice() {
        [] => {}
        [host] => args.host = Some(host.clone()),
        [host, port] => {
            args.host = Some(host.clone());
            args.port = Some(
                port.parse()
                    .map_err(|_| format!("'{port}' is not a port number"))?,
            );
        }
        _ => return Err("too many arguments".to_owned()),
    }
    Ok(args)
}

// ── Interactive prompts ───────────────────────────────────────────────────

/// Read a line from stdin with the prompt shown.
pub fn prompt_line(prompt: &str) -> io::Result<String> {
    let mut out = io::stdout();
    write!(out, "{prompt}")?;
    out.flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Read a line from stdin with echo disabled (passwords).
///
/// The terminal is put into raw mode for the duration; nothing the user
/// types is shown.
pub fn prompt_secret(prompt: &str) -> io::Result<String> {
    let mut out = io::stdout();
    write!(out, "{prompt}")?;
    out.flush()?;

    enable_raw_mode()?;
    let result = read_secret();
    disable_raw_mode()?;
    writeln!(out)?;
    result
}

fn read_secret() -> io::Result<String> {
    let mut secret = String::new();
    loop {
        if let Event::Key(key) = read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Enter => break,
                KeyCode::Backspace => {
                    secret.pop();
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
                }
                KeyCode::Char(c) => secret.push(c),
                _ => {}
            }
        }
    }
    Ok(secret)
}

// ── Tests ─────────────────────────────────────────────────────────────────
