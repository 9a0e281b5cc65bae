//! Screen operations and the raw-command translator.
//!
//! [`translate`] walks a tokenized frame keeping a local cursor and
//! highlight flag, and emits absolute-coordinate [`Operation`]s for the
//! renderer. Popups and AUX-port captures are pulled out here: a popup
//! becomes its own operation variant, AUX payloads go straight to the
//! frame's aux buffer and never touch the screen.

use tracing::{debug, warn};

use crate::ansi::{RawCommand, RawKind};

// ── Operation ─────────────────────────────────────────────────────────────

/// An absolute-coordinate screen mutation.
///
/// Erase targets follow the ANSI convention: `0` cursor→end, `1`
/// cursor→start, `2` everything. Popups carry host notice text and do not
/// mutate the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Write `text` at `(line, column)`, overwriting what is there.
    Write {
        line: usize,
        column: usize,
        text: String,
        highlighted: bool,
    },
    /// Erase within the line at `(line, column)`.
    EraseLine { line: usize, column: usize, target: u8 },
    /// Erase across the display from `(line, column)`.
    EraseScreen { line: usize, column: usize, target: u8 },
    /// A host popup notice (device-control `tmessage`).
    Popup { text: String },
}

impl Operation {
    /// `(line, column)` sort key for display-stable ordering. Popups sit at
    /// the origin.
    pub fn position(&self) -> (usize, usize) {
        match *self {
            Operation::Write { line, column, .. }
            | Operation::EraseLine { line, column, .. }
            | Operation::EraseScreen { line, column, .. } => (line, column),
            Operation::Popup { .. } => (0, 0),
        }
    }

    pub fn is_popup(&self) -> bool {
        matches!(self, Operation::Popup { .. })
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────

/// Everything extracted from one read's buffer, before rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Operations in emission order.
    pub ops: Vec<Operation>,
    /// AUX-port (simulated printer) payloads in arrival order.
    pub aux: Vec<String>,
    /// A BEL arrived in this frame (host end-of-list signal).
    pub bell: bool,
}

// ── Translator ────────────────────────────────────────────────────────────

/// Maximum meaningful erase target; larger values violate the standard.
const MAX_ERASE_TARGET: u16 = 2;

/// Translate tokenized commands into a [`Frame`] of operations.
///
/// Rows are normalised to 0-based (the host numbers them from 1, except on
/// screens where it already sends 0 — a literal row 0 is preserved).
/// Columns are never shifted: the host mixes 0- and 1-based columns across
/// screens and the classifier copes with both.
pub fn translate(commands: &[RawCommand]) -> Frame {
    let mut frame = Frame::default();
    let mut line: usize = 1;
    let mut column: usize = 1;
    let mut highlighted = false;

    for cmd in commands {
        match cmd.kind {
            RawKind::Bell => frame.bell = true,
            RawKind::Device => {
                if cmd.name == "tmessage" {
                    debug!(args = %cmd.text, "host popup");
                    frame.ops.push(Operation::Popup {
                        text: cmd.text.clone(),
                    });
                } else {
                    debug!(name = %cmd.name, "ignoring device-control command");
                }
                continue;
            }
            RawKind::Font | RawKind::Terminator => {}
            RawKind::Csi if cmd.private => {
                // ?25h / ?25l cursor toggles and friends — nothing to draw.
            }
            RawKind::Csi => {
                let n = |p: u16| (p.max(1)) as usize;
                match cmd.finalb {
                    'H' | 'f' => {
                        line = (cmd.params[0] as usize).saturating_sub(1);
                        column = cmd.params[1] as usize;
                    }
                    'A' => line = line.saturating_sub(n(cmd.params[0])),
                    'B' => line += n(cmd.params[0]),
                    'C' => column += n(cmd.params[0]),
                    'D' => column = column.saturating_sub(n(cmd.params[0])),
                    'E' => {
                        line += n(cmd.params[0]);
                        column = 0;
                    }
                    'F' => {
                        line = line.saturating_sub(n(cmd.params[0]));
                        column = 0;
                    }
                    'G' => column = cmd.params[0] as usize,
                    'm' => {
                        for &p in &cmd.params {
                            match p {
                                37 => highlighted = true,
                                32 => highlighted = false,
                                _ => {}
                            }
                        }
                    }
                    'J' => {
                        if cmd.params[0] > MAX_ERASE_TARGET {
                            warn!(erase_target = cmd.params[0], "erase-in-display target out of range");
                        } else {
                            frame.ops.push(Operation::EraseScreen {
                                line,
                                column,
                                target: cmd.params[0] as u8,
                            });
                        }
                    }
                    'K' => {
                        if cmd.params[0] > MAX_ERASE_TARGET {
                            warn!(erase_target = cmd.params[0], "erase-in-line target out of range");
                        } else {
                            frame.ops.push(Operation::EraseLine {
                                line,
                                column,
                                target: cmd.params[0] as u8,
                            });
                        }
                    }
                    'i' => {
                        // AUX port: the trailing text is printer output, not
                        // screen content.
                        if !cmd.text.is_empty() {
                            frame.aux.push(cmd.text.clone());
                        }
                        continue;
                    }
                    other => {
                        debug!(finalb = %other, "no handler for CSI final byte");
                    }
                }
            }
        }

        // Literal text after a positioning/SGR/erase command lands at the
        // current cursor; successive text without a cursor move appends.
        if !cmd.text.is_empty() {
            frame.ops.push(Operation::Write {
                line,
                column,
                text: cmd.text.clone(),
                highlighted,
            });
            column += cmd.text.len();
        }
    }
    frame
}

// ── Tests ─────────────────────────────────────────────────────────────────
