//! Telnet protocol parser and option negotiation.
//!
//! [`TelnetParser`] is a pure byte-stream FSM: feed it raw bytes from the
//! host and get back a list of [`TelnetEvent`]s with all in-band command
//! sequences stripped out of the data.
//!
//! [`Negotiator`] answers the host's WILL/WONT/DO/DONT and subnegotiation
//! requests the way the LIMS expects: accept remote ECHO and
//! SUPPRESS-GO-AHEAD, promise TERMINAL-TYPE and NAWS, cycle through a list
//! of candidate terminal names when asked, and refuse everything else.

use tracing::debug;

// ── Telnet byte constants ──────────────────────────────────────────────────

/// Interpret As Command — starts every Telnet command sequence.
pub const IAC: u8 = 255;
/// Subnegotiation Begin.
pub const SB: u8 = 250;
/// Subnegotiation End.
pub const SE: u8 = 240;
/// WILL — sender will enable the option.
pub const WILL: u8 = 251;
/// WONT — sender will not enable the option.
pub const WONT: u8 = 252;
/// DO — sender requests the receiver to enable the option.
pub const DO: u8 = 253;
/// DONT — sender requests the receiver to disable the option.
pub const DONT: u8 = 254;

/// TTYPE subnegotiation verb: we are stating our terminal type.
pub const TTYPE_IS: u8 = 0;
/// TTYPE subnegotiation verb: the host asks us to state it.
pub const TTYPE_SEND: u8 = 1;

/// Option numbers the host negotiates.
pub mod opt {
    pub const ECHO: u8 = 1;
    /// SUPPRESS-GO-AHEAD.
    pub const SGA: u8 = 3;
    pub const TTYPE: u8 = 24;
    pub const NAWS: u8 = 31;
}

// ── TelnetEvent ───────────────────────────────────────────────────────────

/// A decoded event produced by [`TelnetParser::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// Raw data bytes (non-IAC content).
    Data(Vec<u8>),
    /// Host sent `IAC WILL <opt>`.
    Will(u8),
    /// Host sent `IAC WONT <opt>`.
    Wont(u8),
    /// Host sent `IAC DO <opt>`.
    Do(u8),
    /// Host sent `IAC DONT <opt>`.
    Dont(u8),
    /// Host sent `IAC SB <opt> <payload> IAC SE`.
    Subneg(u8, Vec<u8>),
}

// ── Parser FSM ────────────────────────────────────────────────────────────

#[derive(Debug)]
enum State {
    Normal,
    Iac,
    /// After WILL/WONT/DO/DONT — holds the command byte, awaits the option.
    Cmd(u8),
    /// After `IAC SB` — awaits the option byte.
    SbOpt,
    /// Collecting subnegotiation payload.
    SbData,
    /// Saw `IAC` inside subnegotiation payload.
    SbIac,
}

/// Byte-stream Telnet parser.
///
/// Holds no I/O handles; suitable for wrapping any byte source. Bytes may
/// arrive in arbitrary slices — a command split across two reads is
/// reassembled.
#[derive(Debug)]
pub struct TelnetParser {
    state: State,
    data_buf: Vec<u8>,
    sb_buf: Vec<u8>,
    sb_opt: u8,
}

impl Default for TelnetParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetParser {
    pub fn new() -> Self {
        Self {
            state: State::Normal,
            data_buf: Vec::new(),
            sb_buf: Vec::new(),
            sb_opt: 0,
        }
    }

    /// Feed a slice of raw bytes; returns all events decoded from them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<TelnetEvent> {
        let mut events = Vec::new();
        for &b in bytes {
            self.step(b, &mut events);
        }
        self.flush_data(&mut events);
        events
    }

    fn flush_data(&mut self, events: &mut Vec<TelnetEvent>) {
        if !self.data_buf.is_empty() {
            events.push(TelnetEvent::Data(std::mem::take(&mut self.data_buf)));
        }
    }

    fn step(&mut self, b: u8, events: &mut Vec<TelnetEvent>) {
        match self.state {
            State::Normal => {
                if b == IAC {
                    self.flush_data(events);
                    self.state = State::Iac;
                } else {
                    self.data_buf.push(b);
                }
            }
            State::Iac => match b {
                IAC => {
                    // IAC IAC — escaped literal 0xFF in the data stream.
                    self.data_buf.push(0xFF);
                    self.state = State::Normal;
                }
                WILL | WONT | DO | DONT => {
                    self.state = State::Cmd(b);
                }
                SB => {
                    self.state = State::SbOpt;
                }
                _ => {
                    // NOP, GA, and other single-byte commands carry nothing
                    // the screen pipeline needs.
                    self.state = State::Normal;
                }
            },
            State::Cmd(cmd) => {
                events.push(match cmd {
                    WILL => TelnetEvent::Will(b),
                    WONT => TelnetEvent::Wont(b),
                    DO => TelnetEvent::Do(b),
                    _ => TelnetEvent::Dont(b),
                });
                self.state = State::Normal;
            }
            State::SbOpt => {
                self.sb_opt = b;
                self.sb_buf.clear();
                self.state = State::SbData;
            }
            State::SbData => {
                if b == IAC {
                    self.state = State::SbIac;
                } else {
                    self.sb_buf.push(b);
                }
            }
            State::SbIac => match b {
                SE => {
                    let payload = std::mem::take(&mut self.sb_buf);
                    events.push(TelnetEvent::Subneg(self.sb_opt, payload));
                    self.state = State::Normal;
                }
                IAC => {
                    self.sb_buf.push(0xFF);
                    self.state = State::SbData;
                }
                _ => {
                    // Malformed subnegotiation — discard and recover.
                    debug!(opt = self.sb_opt, "malformed subnegotiation discarded");
                    self.sb_buf.clear();
                    self.state = State::Normal;
                }
            },
        }
    }
}

// ── Negotiator ────────────────────────────────────────────────────────────

/// Answers the host's option negotiation.
///
/// The policy is fixed to what the LIMS host expects from a terminal:
///
/// | Incoming                  | Response                                   |
/// |---------------------------|--------------------------------------------|
/// | `WILL ECHO` / `WILL SGA`  | `DO <opt>`                                 |
/// | `DO TERMINAL-TYPE`        | `WILL TERMINAL-TYPE`                       |
/// | `DO NAWS`                 | `WILL NAWS`                                |
/// | `SB TTYPE SEND`           | `SB TTYPE IS <name> SE`, next candidate    |
/// | `SB NAWS`                 | `SB NAWS <w16> <h16> SE` (big-endian)      |
/// | other `DO`/`DONT`         | `WONT <opt>`                               |
/// | other `WILL`/`WONT`       | `DONT <opt>`                               |
///
/// Each TTYPE request is answered with the next name from the candidate
/// list, so a host that rejects one terminal model can keep asking until it
/// finds one it recognises; the cursor sticks at the final candidate.
#[derive(Debug)]
pub struct Negotiator {
    terminals: Vec<String>,
    term_cursor: usize,
    /// Window dimensions reported via NAWS, `(width, height)`.
    pub window: (u16, u16),
    /// The option byte of the most recent TTYPE/NAWS agreement, kept for
    /// diagnostics.
    pub last_negotiated: u8,
}

impl Negotiator {
    pub fn new(terminals: Vec<String>, window: (u16, u16)) -> Self {
        Self {
            terminals,
            term_cursor: 0,
            window,
            last_negotiated: 0,
        }
    }

    /// Compute the reply (if any) owed for a negotiation event.
    ///
    /// `Data` events return `None`; unknown option combinations are refused,
    /// never escalated.
    pub fn respond(&mut self, event: &TelnetEvent) -> Option<Vec<u8>> {
        match *event {
            TelnetEvent::Will(o) if o == opt::ECHO || o == opt::SGA => {
                Some(vec![IAC, DO, o])
            }
            TelnetEvent::Do(opt::TTYPE) => {
                self.last_negotiated = opt::TTYPE;
                Some(vec![IAC, WILL, opt::TTYPE])
            }
            TelnetEvent::Do(opt::NAWS) => {
                self.last_negotiated = opt::NAWS;
                Some(vec![IAC, WILL, opt::NAWS])
            }
            TelnetEvent::Do(o) | TelnetEvent::Dont(o) => {
                debug!(option = o, "refusing DO/DONT");
                Some(vec![IAC, WONT, o])
            }
            TelnetEvent::Will(o) | TelnetEvent::Wont(o) => {
                debug!(option = o, "refusing WILL/WONT");
                Some(vec![IAC, DONT, o])
            }
            TelnetEvent::Subneg(opt::TTYPE, ref payload) => {
                if payload.first() != Some(&TTYPE_SEND) {
                    return None;
                }
                let name = self
                    .terminals
                    .get(self.term_cursor)
                    .map(String::as_str)
                    .unwrap_or("");
                debug!(terminal = name, "answering TTYPE request");
                if self.term_cursor + 1 < self.terminals.len() {
                    self.term_cursor += 1;
                }
                Some(build_ttype_is(name))
            }
            TelnetEvent::Subneg(opt::NAWS, _) => {
                debug!(width = self.window.0, height = self.window.1, "answering NAWS request");
                Some(build_naws(self.window.0, self.window.1))
            }
            TelnetEvent::Subneg(o, _) => {
                debug!(option = o, "ignoring unknown subnegotiation");
                None
            }
            TelnetEvent::Data(_) => None,
        }
    }
}

// ── Subnegotiation builders ───────────────────────────────────────────────

/// Build an `IAC SB <opt> <payload> IAC SE` sequence.
///
/// Any `0xFF` bytes in `payload` are escaped as `IAC IAC`.
pub fn build_subneg(option: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + payload.len());
    buf.extend_from_slice(&[IAC, SB, option]);
    for &b in payload {
        if b == IAC {
            buf.push(IAC);
        }
        buf.push(b);
    }
    buf.extend_from_slice(&[IAC, SE]);
    buf
}

/// Build a TTYPE `IS <name>` subnegotiation response.
pub fn build_ttype_is(name: &str) -> Vec<u8> {
    let mut payload = vec![TTYPE_IS];
    payload.extend_from_slice(name.as_bytes());
    build_subneg(opt::TTYPE, &payload)
}

/// Build a NAWS subnegotiation advertising `width × height`.
pub fn build_naws(width: u16, height: u16) -> Vec<u8> {
    let payload = [
        (width >> 8) as u8,
        width as u8,
        (height >> 8) as u8,
        height as u8,
    ];
    build_subneg(opt::NAWS, &payload)
}

// ── Tests ─────────────────────────────────────────────────────────────────
