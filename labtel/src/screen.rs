//! Virtual screen: the rendered result of applying one frame's operations
//! on top of the previous frame's lines.
//!
//! The host draws differentially — most frames only rewrite the lines that
//! changed — so rendering always starts from the previous screen unless an
//! erase-whole-display operation resets it. Highlighted writes double as
//! named field extractors via [`Screen::chunk_or_none`].

use std::collections::VecDeque;

use tracing::warn;

use crate::op::{Frame, Operation};

/// Lines beyond this are treated as render anomalies (a corrupt positioning
/// parameter, not a real screen).
const MAX_LINE: usize = 10_000;
/// Columns beyond this are render anomalies.
const MAX_COLUMN: usize = 65_535;

// ── Screen ────────────────────────────────────────────────────────────────

/// One rendered frame plus its classification.
///
/// All fields are read-only to callers; the session driver fills the
/// classification fields (`kind`, `options`, `option_str`,
/// `default_option`) after rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    /// Rendered lines, top to bottom. Implicit whitespace is materialised
    /// when a write lands past the current end of a line.
    pub lines: Vec<String>,
    /// The frame's operations, in emission order.
    pub ops: Vec<Operation>,
    /// AUX-port (simulated printer) captures, in arrival order.
    pub aux_data: Vec<String>,
    /// Popup notice texts collected in this frame.
    pub errors: Vec<String>,
    /// A BEL arrived in this frame.
    pub bell: bool,
    /// `(row, column)` of the last positioned operation.
    pub cursor: (usize, usize),
    /// Classified screen type; `"UNKNOWN"` until classified.
    pub kind: String,
    /// Menu options parsed from the option line.
    pub options: Vec<String>,
    /// The raw option line.
    pub option_str: String,
    /// The `<X>` default marker's content.
    pub default_option: String,
    /// The frame collected at least one popup.
    pub has_errors: bool,
}

impl Default for Screen {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            ops: Vec::new(),
            aux_data: Vec::new(),
            errors: Vec::new(),
            bell: false,
            cursor: (0, 0),
            kind: "UNKNOWN".to_owned(),
            options: Vec::new(),
            option_str: String::new(),
            default_option: "^".to_owned(),
            has_errors: false,
        }
    }
}

impl Screen {
    /// Render a frame against the previous frame's lines.
    pub fn render(frame: Frame, prev_lines: &[String]) -> Self {
        let mut screen = Screen {
            lines: prev_lines.to_vec(),
            aux_data: frame.aux,
            bell: frame.bell,
            ..Screen::default()
        };
        for op in &frame.ops {
            screen.apply(op);
        }
        screen.ops = frame.ops;
        screen
    }

    fn apply(&mut self, op: &Operation) {
        if let Operation::Popup { text } = op {
            self.errors.push(text.clone());
            self.has_errors = true;
            return;
        }

        let (line, column) = op.position();
        if line > MAX_LINE || column > MAX_COLUMN {
            warn!(line, column, "operation addresses an impossible coordinate; skipped");
            return;
        }
        self.cursor = (line, column);
        while self.lines.len() <= line {
            self.lines.push(String::new());
        }

        match *op {
            Operation::EraseLine { target, .. } => {
                let l = &mut self.lines[line];
                match target {
                    // Cursor to end of line.
                    0 => l.truncate(column),
                    // Cursor to start of line: blank the prefix, keep the tail.
                    1 => {
                        let tail = l.get(column..).unwrap_or("").to_owned();
                        *l = " ".repeat(column);
                        l.push_str(&tail);
                    }
                    // Whole line.
                    _ => l.clear(),
                }
            }
            Operation::EraseScreen { target, .. } => match target {
                // Cursor to end of screen: truncate this line, drop the rest.
                0 => {
                    let kept = self.lines[line].get(..column).unwrap_or(&self.lines[line]).to_owned();
                    self.lines.truncate(line);
                    self.lines.push(kept);
                }
                // Cursor to start of screen: blank everything before the
                // cursor, keep this line's tail and all later lines.
                1 => {
                    let l = &mut self.lines[line];
                    let tail = l.get(column..).unwrap_or("").to_owned();
                    *l = " ".repeat(column);
                    l.push_str(&tail);
                    for earlier in &mut self.lines[..line] {
                        earlier.clear();
                    }
                }
                // Whole screen.
                _ => self.lines.clear(),
            },
            Operation::Write { ref text, .. } => {
                let l = &mut self.lines[line];
                if l.len() < column {
                    l.push_str(&" ".repeat(column - l.len()));
                }
                if column < l.len() {
                    // Overwrite in place, keeping any tail past the text.
                    let tail_start = column + text.len();
                    let tail = l.get(tail_start..).unwrap_or("").to_owned();
                    l.truncate(column);
                    l.push_str(text);
                    l.push_str(&tail);
                } else {
                    l.push_str(text);
                }
            }
            Operation::Popup { .. } => unreachable!("handled above"),
        }
    }

    /// The screen as a single newline-joined string.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Highlighted write operations of this frame, sorted by
    /// `(line, column)`.
    pub fn chunks(&self) -> Vec<&Operation> {
        let mut chunks: Vec<&Operation> = self
            .ops
            .iter()
            .filter(|op| matches!(op, Operation::Write { highlighted: true, .. }))
            .collect();
        chunks.sort_by_key(|op| op.position());
        chunks
    }

    /// The text of the unique write starting at `(line, column)`.
    ///
    /// With `highlighted` given, only writes with that highlight state are
    /// considered. Returns `None` when no write matches — or when more than
    /// one does, since an ambiguous field extraction is worthless.
    pub fn chunk_or_none(
        &self,
        line: usize,
        column: usize,
        highlighted: Option<bool>,
    ) -> Option<&str> {
        let mut found: Option<&str> = None;
        for op in &self.ops {
            if let Operation::Write {
                line: l,
                column: c,
                ref text,
                highlighted: h,
            } = *op
            {
                if l == line && c == column && highlighted.map_or(true, |want| want == h) {
                    if found.is_some() {
                        warn!(line, column, "multiple chunk candidates; refine the lookup");
                        return None;
                    }
                    found = Some(text);
                }
            }
        }
        found
    }

    /// Number of rendered lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

// ── ScreenHistory ─────────────────────────────────────────────────────────

/// Bounded ring of recent screens, newest last.
///
/// The previous frame's lines seed the next render (the host draws
/// differentially); the rest of the ring exists for diagnostics.
#[derive(Debug)]
pub struct ScreenHistory {
    frames: VecDeque<Screen>,
    cap: usize,
}

impl ScreenHistory {
    /// Create a ring keeping at most `cap` screens (minimum 1).
    pub fn new(cap: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, screen: Screen) {
        self.frames.push_back(screen);
        while self.frames.len() > self.cap {
            self.frames.pop_front();
        }
    }

    /// The most recent screen, if any.
    pub fn last(&self) -> Option<&Screen> {
        self.frames.back()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Oldest-first iteration.
    pub fn iter(&self) -> impl Iterator<Item = &Screen> {
        self.frames.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ansi::tokenize;
    use crate::op::translate;

    fn render_bytes(bytes: &[u8], prev: &[String]) -> Screen {
        Screen::render(translate(&tokenize(bytes)), prev)
    }

    fn lines(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn write_materialises_implicit_whitespace() {
        let s = render_bytes(b"\x1b[1;5HX", &[]);
        assert_eq!(s.lines, lines(&["    X"]));
    }

    #[test]
    fn write_overwrites_in_place() {
        let s = render_bytes(b"\x1b[1;2HXY", &lines(&["abcdef"]));
        assert_eq!(s.lines, lines(&["abXYef"]));
    }

    #[test]
    fn write_past_end_appends() {
        let s = render_bytes(b"\x1b[1;3HXYZ", &lines(&["ab"]));
        assert_eq!(s.lines, lines(&["ab XYZ"]));
    }

    #[test]
    fn empty_frame_preserves_previous_lines() {
        let prev = lines(&["one", "two"]);
        let s = Screen::render(Frame::default(), &prev);
        assert_eq!(s.lines, prev);
    }

    #[test]
    fn partial_update_composes_with_previous_frame() {
        let prev = lines(&["l0", "l1", "l2", "l3", "l4"]);
        let s = render_bytes(b"\x1b[3;0H\x1b[2K\x1b[3;0HHELLO", &prev);
        assert_eq!(s.lines, lines(&["l0", "l1", "HELLO", "l3", "l4"]));
    }

    #[test]
    fn erase_line_to_end() {
        let s = render_bytes(b"\x1b[1;3H\x1b[K", &lines(&["abcdef"]));
        assert_eq!(s.lines, lines(&["abc"]));
    }

    #[test]
    fn erase_line_to_start() {
        let s = render_bytes(b"\x1b[1;3H\x1b[1K", &lines(&["abcdef"]));
        assert_eq!(s.lines, lines(&["   def"]));
    }

    #[test]
    fn erase_line_whole() {
        let s = render_bytes(b"\x1b[1;3H\x1b[2K", &lines(&["abcdef"]));
        assert_eq!(s.lines, lines(&[""]));
    }

    #[test]
    fn erase_line_target0_at_column0_equals_whole_line() {
        let prev = lines(&["abcdef"]);
        let a = render_bytes(b"\x1b[1;0H\x1b[K", &prev);
        let b = render_bytes(b"\x1b[1;0H\x1b[2K", &prev);
        assert_eq!(a.lines, b.lines);
    }

    #[test]
    fn erase_screen_to_end() {
        let prev = lines(&["aaa", "bbb", "ccc"]);
        let s = render_bytes(b"\x1b[2;1H\x1b[J", &prev);
        assert_eq!(s.lines, lines(&["aaa", "b"]));
    }

    #[test]
    fn erase_screen_to_start() {
        let prev = lines(&["aaa", "bbb", "ccc"]);
        let s = render_bytes(b"\x1b[2;1H\x1b[1J", &prev);
        assert_eq!(s.lines, lines(&["", " bb", "ccc"]));
    }

    #[test]
    fn erase_screen_whole_resets() {
        let prev = lines(&["aaa", "bbb"]);
        let s = render_bytes(b"\x1b[2J\x1b[1;0Hfresh", &prev);
        assert_eq!(s.lines, lines(&["fresh"]));
    }

    #[test]
    fn popup_leaves_lines_untouched() {
        let prev = lines(&["menu line"]);
        let s = render_bytes(b"\x1bP$tmessage \"No such specimen\" error", &prev);
        assert_eq!(s.lines, prev);
        assert!(s.has_errors);
        assert_eq!(s.errors.len(), 1);
        assert!(s.errors[0].contains("No such specimen"));
    }

    #[test]
    fn popup_alone_on_empty_history() {
        let s = render_bytes(b"\x1bP$tmessage \"boom\" error", &[]);
        assert!(s.lines.is_empty());
        assert!(s.has_errors);
    }

    #[test]
    fn line_count_covers_highest_addressed_line() {
        let s = render_bytes(b"\x1b[7;0Hdeep", &lines(&["top"]));
        assert_eq!(s.len(), 7);
    }

    #[test]
    fn absurd_coordinates_are_skipped() {
        let s = render_bytes(b"\x1b[60000;1Hx", &[]);
        assert!(s.lines.is_empty());
    }

    #[test]
    fn cursor_tracks_last_positioned_op() {
        let s = render_bytes(b"\x1b[3;4Habc\x1b[6;1Hz", &[]);
        assert_eq!(s.cursor, (5, 1));
    }

    #[test]
    fn aux_data_not_rendered() {
        let s = render_bytes(b"\x1b[5iREPORT BODY\x1b\\", &[]);
        assert_eq!(s.aux_data, vec!["REPORT BODY".to_owned()]);
        assert!(s.lines.is_empty());
    }

    // ── chunks ────────────────────────────────────────────────────────────

    #[test]
    fn chunk_lookup_unique_highlight() {
        let s = render_bytes(b"\x1b[2;10H\x1b[0;1;37mFIELD\x1b[32m rest", &[]);
        assert_eq!(s.chunk_or_none(1, 10, Some(true)), Some("FIELD"));
        assert_eq!(s.chunk_or_none(1, 10, Some(false)), None);
        assert_eq!(s.chunk_or_none(3, 3, None), None);
    }

    #[test]
    fn chunk_lookup_ambiguous_returns_none() {
        let s = render_bytes(b"\x1b[2;10H\x1b[37mAA\x1b[2;10H\x1b[37mBB", &[]);
        assert_eq!(s.chunk_or_none(1, 10, Some(true)), None);
    }

    #[test]
    fn chunks_sorted_by_position() {
        let s = render_bytes(b"\x1b[5;2H\x1b[37mlater\x1b[1;9H\x1b[37msooner", &[]);
        let positions: Vec<_> = s.chunks().iter().map(|c| c.position()).collect();
        assert_eq!(positions, vec![(0, 9), (4, 2)]);
    }

    // ── history ───────────────────────────────────────────────────────────

    #[test]
    fn history_bounded() {
        let mut h = ScreenHistory::new(3);
        for i in 0..5 {
            let mut s = Screen::default();
            s.lines = vec![format!("frame {i}")];
            h.push(s);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.last().unwrap().lines[0], "frame 4");
        assert_eq!(h.iter().next().unwrap().lines[0], "frame 2");
    }

    #[test]
    fn history_capacity_clamped_to_one() {
        let mut h = ScreenHistory::new(0);
        h.push(Screen::default());
        h.push(Screen::default());
        assert_eq!(h.len(), 1);
    }
}
