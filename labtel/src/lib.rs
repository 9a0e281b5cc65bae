//! labtel — terminal-emulation and session-automation engine for
//! telnet-era LIMS hosts.
//!
//! A legacy Laboratory Information Management System is reachable only as a
//! mainframe-style ANSI terminal session over telnet. This crate drives
//! that session programmatically: it negotiates the telnet options the host
//! insists on, parses the escape-sequence stream, reproduces the screen the
//! host "draws" on a virtual terminal, classifies the result, and exposes
//! the handful of primitives — `send`, `read`, `return_to_main_menu` — that
//! scripted workflows are built from.
//!
//! Pipeline, leaves first:
//!
//! 1. [`telnet`] — byte-stream command parsing and option negotiation.
//! 2. [`transport`] — the TCP session plus the pure protocol glue
//!    (negotiation replies, ENQ answerback, bounded drain reads).
//! 3. [`ansi`] — raw escape-sequence tokenizing.
//! 4. [`op`] — translation into absolute-coordinate screen operations.
//! 5. [`screen`] — the virtual screen and its history ring.
//! 6. [`classify`] — pluggable screen recognition.
//! 7. [`session`] — the driver tying it all together.

pub mod ansi;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod op;
pub mod sample;
pub mod screen;
pub mod session;
pub mod telnet;
pub mod transport;

pub use classify::{Classification, ScreenClassifier};
pub use config::{Config, Dialect, HostConfig};
pub use error::{Error, Result};
pub use screen::Screen;
pub use session::{ReadOpts, Session};
