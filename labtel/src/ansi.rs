//! Raw ANSI tokenizer.
//!
//! Splits a received byte buffer into [`RawCommand`]s: CSI sequences
//! (`ESC [ params final`), font designations (`ESC ( final`), device-control
//! commands (`ESC P $ name params`), string terminators (`ESC \`), and
//! literal bells. Literal text between one escape and the next rides along
//! as the `text` of the preceding command.
//!
//! The host speaks 7-bit ASCII; anything above `0x7F` that survives telnet
//! decoding is replaced and logged. Tokens that cannot be classified are
//! parse anomalies: logged and dropped, never fatal.

use aho_corasick::AhoCorasick;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Escape introducing every control sequence.
pub const ESC: char = '\x1b';
/// Bell, used by the host as an end-of-list signal.
pub const BEL: char = '\x07';

// ── RawCommand ────────────────────────────────────────────────────────────

/// What kind of sequence a [`RawCommand`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    /// `ESC [ params intermediates final`.
    Csi,
    /// `ESC ( final` or `ESC ) final` — font designation.
    Font,
    /// `ESC P $ name params` — device-private command (popups ride here).
    Device,
    /// `ESC \` — string terminator, ends a device-control payload.
    Terminator,
    /// Literal `BEL`.
    Bell,
}

/// A single parsed escape sequence or literal, plus the text that followed
/// it before the next escape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub kind: RawKind,
    /// Final byte of a CSI or font sequence; `\0` otherwise.
    pub finalb: char,
    /// Numeric parameters, `;`-split, missing positions zero.
    pub params: [u16; 3],
    /// Parameter bytes exactly as received (needed to re-serialise private
    /// sequences such as `?25`).
    pub params_raw: String,
    /// Intermediate bytes (`0x20..=0x2F`) of a CSI sequence.
    pub intermediates: String,
    /// Private sequence: parameter byte in `0x3C..=0x3F` or final byte in
    /// `0x70..=0x7E`. Numeric parameters are not meaningful.
    pub private: bool,
    /// Device-control command name (e.g. `tmessage`).
    pub name: String,
    /// Literal text following the sequence, up to the next escape.
    pub text: String,
    /// `'('` or `')'` for font designations; `\0` otherwise.
    pub designator: char,
}

impl RawCommand {
    fn blank(kind: RawKind) -> Self {
        Self {
            kind,
            finalb: '\0',
            params: [0; 3],
            params_raw: String::new(),
            intermediates: String::new(),
            private: false,
            name: String::new(),
            text: String::new(),
            designator: '\0',
        }
    }

    /// Re-serialise to the original byte form (escape prefix + trailing
    /// text). Tokenizing well-formed input and concatenating `to_bytes` of
    /// every command reproduces the buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut s = String::new();
        match self.kind {
            RawKind::Csi => {
                s.push(ESC);
                s.push('[');
                s.push_str(&self.params_raw);
                s.push_str(&self.intermediates);
                s.push(self.finalb);
            }
            RawKind::Font => {
                s.push(ESC);
                s.push(self.designator);
                s.push_str(&self.params_raw);
                s.push(self.finalb);
            }
            RawKind::Device => {
                s.push(ESC);
                s.push_str("P$");
                s.push_str(&self.name);
                s.push(' ');
            }
            RawKind::Terminator => {
                s.push(ESC);
                s.push('\\');
            }
            RawKind::Bell => s.push(BEL),
        }
        s.push_str(&self.text);
        s.into_bytes()
    }
}

// ── Tokenizer ─────────────────────────────────────────────────────────────

/// Automaton finding every split point (positions of ESC and BEL).
fn splitter() -> &'static AhoCorasick {
    static AC: OnceLock<AhoCorasick> = OnceLock::new();
    AC.get_or_init(|| AhoCorasick::new(["\x1b", "\x07"]))
}

/// Decode a telnet-stripped buffer as 7-bit ASCII.
///
/// Bytes above `0x7F` should not occur; each run is replaced with `?` and
/// logged once per buffer.
fn decode_ascii(buffer: &[u8]) -> String {
    let mut warned = false;
    buffer
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                if !warned {
                    warn!(byte = b, "non-ASCII byte in host data");
                    warned = true;
                }
                '?'
            }
        })
        .collect()
}

/// Tokenize a raw buffer into [`RawCommand`]s.
///
/// The buffer is split at every ESC/BEL position; each token is classified
/// independently. A leading run of text with no escape prefix is tolerated
/// when it is a device-control announcement chopped by a read boundary
/// (`P$…`); otherwise it is logged and skipped.
pub fn tokenize(buffer: &[u8]) -> Vec<RawCommand> {
    let text = decode_ascii(buffer);
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut commands = Vec::new();
    let mut start = 0usize;

    // A buffer whose first token carries no escape came apart at a read
    // boundary. A device-control announcement is recoverable; anything else
    // suggests a missed read.
    if !trimmed.starts_with(ESC) && !trimmed.starts_with(BEL) {
        let first_escape = splitter().find(trimmed).map(|m| m.start());
        if let Some(cmd) = parse_device_body(trimmed.split(ESC).next().unwrap_or(trimmed)) {
            commands.push(cmd);
        } else {
            warn!("buffer does not begin with an escape sequence; skipping prefix");
            debug!(prefix = &trimmed[..first_escape.unwrap_or(trimmed.len()).min(100)]);
        }
        match first_escape {
            Some(pos) => start = pos,
            None => return commands,
        }
    }
    let body = &trimmed[start..];

    let mut positions: Vec<usize> = splitter().find_iter(body).map(|m| m.start()).collect();
    positions.push(body.len());
    for pair in positions.windows(2) {
        let token = &body[pair[0]..pair[1]];
        if token.is_empty() {
            continue;
        }
        match parse_token(token) {
            Some(cmd) => commands.push(cmd),
            None => debug!(token, "unclassifiable token dropped"),
        }
    }
    commands
}

/// Classify one token (starts with ESC or BEL; runs to the next escape).
fn parse_token(token: &str) -> Option<RawCommand> {
    let mut chars = token.chars();
    match chars.next()? {
        BEL => {
            let mut cmd = RawCommand::blank(RawKind::Bell);
            cmd.text = chars.collect();
            Some(cmd)
        }
        ESC => match chars.next() {
            Some('[') => parse_csi(&token[2..]),
            Some(d @ ('(' | ')')) => parse_font(d, &token[2..]),
            Some('P') if token[2..].starts_with('$') => parse_device_body(&token[2..]),
            Some('\\') => {
                let mut cmd = RawCommand::blank(RawKind::Terminator);
                cmd.text = token[2..].to_owned();
                Some(cmd)
            }
            _ => None,
        },
        _ => None,
    }
}

/// Parse the body of a CSI sequence (everything after `ESC [`).
fn parse_csi(body: &str) -> Option<RawCommand> {
    if body.is_empty() {
        // A bare `ESC [` fragment at a buffer boundary; nothing to do.
        debug!("bare CSI introducer dropped");
        return None;
    }
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (0x30..=0x3F).contains(&bytes[i]) {
        i += 1;
    }
    let params_end = i;
    while i < bytes.len() && (0x20..=0x2F).contains(&bytes[i]) {
        i += 1;
    }
    let inter_end = i;
    if i >= bytes.len() || !(0x40..=0x7E).contains(&bytes[i]) {
        return None;
    }
    let finalb = bytes[i] as char;

    let mut cmd = RawCommand::blank(RawKind::Csi);
    cmd.finalb = finalb;
    cmd.params_raw = body[..params_end].to_owned();
    cmd.intermediates = body[params_end..inter_end].to_owned();
    cmd.text = body[i + 1..].to_owned();
    cmd.private = cmd.params_raw.bytes().any(|b| (0x3C..=0x3F).contains(&b))
        || ('\u{70}'..='\u{7E}').contains(&finalb);
    if !cmd.private {
        for (slot, part) in cmd.params_raw.split(';').take(3).enumerate() {
            cmd.params[slot] = part.parse().unwrap_or(0);
        }
    }
    Some(cmd)
}

/// Parse the body of a font designation (everything after `ESC (` / `ESC )`).
fn parse_font(designator: char, body: &str) -> Option<RawCommand> {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (0x20..=0x2F).contains(&bytes[i]) {
        i += 1;
    }
    if i >= bytes.len() || !(0x30..=0x7E).contains(&bytes[i]) {
        return None;
    }
    let mut cmd = RawCommand::blank(RawKind::Font);
    cmd.designator = designator;
    cmd.params_raw = body[..i].to_owned();
    cmd.finalb = bytes[i] as char;
    cmd.text = body[i + 1..].to_owned();
    Some(cmd)
}

/// Parse a device-control body: `$name params…` (the `ESC P` may be absent
/// when the announcement was chopped by a read boundary).
fn parse_device_body(body: &str) -> Option<RawCommand> {
    let rest = body.strip_prefix("P$").or_else(|| body.strip_prefix('$'))?;
    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return None;
    }
    let mut cmd = RawCommand::blank(RawKind::Device);
    cmd.name = rest[..name_len].to_owned();
    cmd.text = rest[name_len..].strip_prefix(' ').unwrap_or("").to_owned();
    Some(cmd)
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn one(bytes: &[u8]) -> RawCommand {
        let cmds = tokenize(bytes);
        assert_eq!(cmds.len(), 1, "expected one command, got {cmds:?}");
        cmds.into_iter().next().unwrap()
    }

    #[test]
    fn csi_cursor_position() {
        let cmd = one(b"\x1b[5;12HHello");
        assert_eq!(cmd.kind, RawKind::Csi);
        assert_eq!(cmd.finalb, 'H');
        assert_eq!(cmd.params, [5, 12, 0]);
        assert_eq!(cmd.text, "Hello");
        assert!(!cmd.private);
    }

    #[test]
    fn csi_missing_params_default_to_zero() {
        let cmd = one(b"\x1b[J");
        assert_eq!(cmd.finalb, 'J');
        assert_eq!(cmd.params, [0, 0, 0]);
    }

    #[test]
    fn csi_three_params() {
        let cmd = one(b"\x1b[0;1;37m");
        assert_eq!(cmd.finalb, 'm');
        assert_eq!(cmd.params, [0, 1, 37]);
    }

    #[test]
    fn csi_private_cursor_toggle() {
        let cmd = one(b"\x1b[?25l");
        assert!(cmd.private);
        assert_eq!(cmd.params_raw, "?25");
        assert_eq!(cmd.finalb, 'l');
        assert_eq!(cmd.params, [0, 0, 0]);
    }

    #[test]
    fn csi_private_final_byte() {
        // Final byte in 0x70..=0x7E marks a private sequence.
        let cmd = one(b"\x1b[3q");
        assert!(cmd.private);
    }

    #[test]
    fn font_designation() {
        let cmd = one(b"\x1b(B");
        assert_eq!(cmd.kind, RawKind::Font);
        assert_eq!(cmd.designator, '(');
        assert_eq!(cmd.finalb, 'B');
    }

    #[test]
    fn device_control_popup() {
        let cmd = one(b"\x1bP$tmessage \"No such specimen\" title \"Enquiry\" error");
        assert_eq!(cmd.kind, RawKind::Device);
        assert_eq!(cmd.name, "tmessage");
        assert_eq!(cmd.text, "\"No such specimen\" title \"Enquiry\" error");
    }

    #[test]
    fn string_terminator() {
        let cmd = one(b"\x1b\\");
        assert_eq!(cmd.kind, RawKind::Terminator);
        assert!(cmd.text.is_empty());
    }

    #[test]
    fn bell_token() {
        let cmd = one(b"\x07");
        assert_eq!(cmd.kind, RawKind::Bell);
    }

    #[test]
    fn split_on_every_escape() {
        let cmds = tokenize(b"\x1b[1;1HAAA\x1b[2;1HBBB\x07");
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0].text, "AAA");
        assert_eq!(cmds[1].text, "BBB");
        assert_eq!(cmds[2].kind, RawKind::Bell);
    }

    #[test]
    fn chopped_device_announcement_tolerated() {
        let cmds = tokenize(b"P$tmessage \"late popup\" error");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].kind, RawKind::Device);
        assert_eq!(cmds[0].name, "tmessage");
    }

    #[test]
    fn leading_plain_text_skipped_with_warning() {
        let cmds = tokenize(b"stray echo\x1b[1;1HX");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].text, "X");
    }

    #[test]
    fn buffer_without_escapes_yields_nothing() {
        assert!(tokenize(b"no escapes here").is_empty());
    }

    #[test]
    fn unknown_escape_dropped() {
        // `ESC =` (keypad mode) is not part of the host's repertoire.
        let cmds = tokenize(b"\x1b=\x1b[1;1HX");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].finalb, 'H');
    }

    #[test]
    fn reserialise_round_trips() {
        let input: &[u8] = b"\x1b[5;12HHello\x1b[0;1;37m highlight\x1b[?25l\x1b[2J";
        let bytes: Vec<u8> = tokenize(input).iter().flat_map(|c| c.to_bytes()).collect();
        assert_eq!(bytes, input);
    }

    #[test]
    fn tokens_reproduce_contiguous_substrings() {
        let input: &[u8] = b"\x1b[1;1HAAA\x1b[2;1HBBB\x1b[2J";
        let text = String::from_utf8(input.to_vec()).unwrap();
        for cmd in tokenize(input) {
            let piece = String::from_utf8(cmd.to_bytes()).unwrap();
            assert!(text.contains(&piece), "{piece:?} not a substring");
        }
    }
}
