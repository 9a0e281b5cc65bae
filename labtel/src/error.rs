//! Session error taxonomy.
//!
//! Parse and render anomalies never appear here — they are logged where
//! they happen and the pipeline carries on. Host popups normally surface on
//! the frame (`Screen::errors`); [`Error::Host`] exists for callers that
//! choose to promote them.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// TCP read/write failed or the connection dropped. Fatal to the
    /// session; disconnect still runs.
    Transport(io::Error),
    /// A read's wait budget elapsed with no bytes. Recoverable.
    Timeout,
    /// `return_to_main_menu` exhausted its tries. Fatal to the current
    /// workflow; reconnect.
    NavigationLost { tries: usize },
    /// Login never reached the main menu, or the host demanded a password
    /// change.
    LoginFailure(String),
    /// Host popup notices promoted to an error by the caller.
    Host(Vec<String>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport failure: {e}"),
            Error::Timeout => write!(f, "host sent nothing within the wait budget"),
            Error::NavigationLost { tries } => {
                write!(f, "could not reach the main menu in {tries} attempts")
            }
            Error::LoginFailure(why) => write!(f, "login failed: {why}"),
            Error::Host(msgs) => write!(f, "host error: {}", msgs.join("; ")),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
