use proptest::prelude::*;

use labtel::ansi::{tokenize, RawKind};
use labtel::op::{translate, Frame, Operation};
use labtel::screen::Screen;

// ── Tokenizer ─────────────────────────────────────────────────────────────

proptest! {
    /// Arbitrary bytes — including truncated escapes and binary noise —
    /// must never panic the tokenizer.
    #[test]
    fn tokenizer_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let _ = tokenize(&bytes);
    }

    /// A well-formed CSI sequence re-serialises to its original bytes.
    #[test]
    fn csi_round_trips(
        params in proptest::collection::vec(0u16..10_000, 0..3),
        finalb in prop::sample::select(vec!['H', 'f', 'J', 'K', 'm', 'A', 'B', 'G', 'i']),
        text in "[ -~&&[^\\x1b\\x07]]{0,40}",
    ) {
        let param_str = params
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(";");
        let input = format!("\x1b[{param_str}{finalb}{text}");
        let cmds = tokenize(input.as_bytes());
        prop_assert_eq!(cmds.len(), 1);
        prop_assert_eq!(cmds[0].to_bytes(), input.as_bytes());
    }

    /// Every command's re-serialisation is a contiguous substring of the
    /// input, and in order they reproduce the whole well-formed stream.
    #[test]
    fn commands_cover_well_formed_input(
        rows in proptest::collection::vec((1u16..25, 0u16..80, "[ -~&&[^\\x1b\\x07\\\\]]{1,20}"), 1..10),
    ) {
        let mut input = String::new();
        for (row, col, text) in &rows {
            input.push_str(&format!("\x1b[{row};{col}H{text}"));
        }
        let rebuilt: Vec<u8> = tokenize(input.as_bytes())
            .iter()
            .flat_map(|c| c.to_bytes())
            .collect();
        prop_assert_eq!(rebuilt, input.into_bytes());
    }
}

// ── Translator ────────────────────────────────────────────────────────────

proptest! {
    /// A write lands exactly where the preceding positioning command put
    /// the cursor, and consecutive texts advance the column by their
    /// length.
    #[test]
    fn writes_carry_the_cursor(
        row in 1u16..25,
        col in 0u16..80,
        first in "[ -~&&[^\\x1b\\x07\\\\]]{1,20}",
        second in "[ -~&&[^\\x1b\\x07\\\\]]{1,20}",
    ) {
        let input = format!("\x1b[{row};{col}H{first}\x1b[m{second}");
        let frame = translate(&tokenize(input.as_bytes()));
        prop_assert_eq!(frame.ops.len(), 2);
        prop_assert_eq!(frame.ops[0].position(), (row as usize - 1, col as usize));
        prop_assert_eq!(
            frame.ops[1].position(),
            (row as usize - 1, col as usize + first.len())
        );
    }
}

// ── Renderer ──────────────────────────────────────────────────────────────

fn arb_op() -> impl Strategy<Value = Operation> {
    let write = ("[ -~]{1,12}", 0usize..30, 0usize..60, any::<bool>()).prop_map(
        |(text, line, column, highlighted)| Operation::Write {
            line,
            column,
            text,
            highlighted,
        },
    );
    let erase_line = (0usize..30, 0usize..60, 0u8..3).prop_map(|(line, column, target)| {
        Operation::EraseLine { line, column, target }
    });
    let erase_screen = (0usize..30, 0usize..60, 0u8..3).prop_map(|(line, column, target)| {
        Operation::EraseScreen { line, column, target }
    });
    prop_oneof![4 => write, 1 => erase_line, 1 => erase_screen]
}

proptest! {
    /// Rendering an empty operation list yields the previous frame's lines.
    #[test]
    fn empty_frame_is_identity(prev in proptest::collection::vec("[ -~]{0,60}", 0..30)) {
        let screen = Screen::render(Frame::default(), &prev);
        prop_assert_eq!(screen.lines, prev);
    }

    /// An erase-whole-screen followed by any operations equals rendering
    /// those operations on an empty screen.
    #[test]
    fn full_erase_forgets_the_past(
        prev in proptest::collection::vec("[ -~]{0,60}", 0..30),
        ops in proptest::collection::vec(arb_op(), 0..20),
    ) {
        let mut with_clear = vec![Operation::EraseScreen { line: 0, column: 0, target: 2 }];
        with_clear.extend(ops.clone());

        let a = Screen::render(Frame { ops: with_clear, ..Frame::default() }, &prev);
        let b = Screen::render(Frame { ops, ..Frame::default() }, &[]);
        prop_assert_eq!(a.lines, b.lines);
    }

    /// Rendering is deterministic.
    #[test]
    fn rendering_is_deterministic(
        prev in proptest::collection::vec("[ -~]{0,60}", 0..10),
        ops in proptest::collection::vec(arb_op(), 0..20),
    ) {
        let a = Screen::render(Frame { ops: ops.clone(), ..Frame::default() }, &prev);
        let b = Screen::render(Frame { ops, ..Frame::default() }, &prev);
        prop_assert_eq!(a.lines, b.lines);
    }
}

// ── Whole pipeline ────────────────────────────────────────────────────────

proptest! {
    /// Random positioned writes always land inside the rendered screen and
    /// the pipeline never produces out-of-bounds lines.
    #[test]
    fn pipeline_lines_cover_writes(
        rows in proptest::collection::vec((1u16..25, 0u16..80, "[ -~&&[^\\x1b\\x07\\\\]]{1,10}"), 1..8),
    ) {
        let mut input = String::new();
        for (row, col, text) in &rows {
            input.push_str(&format!("\x1b[{row};{col}H{text}"));
        }
        let frame = translate(&tokenize(input.as_bytes()));
        let screen = Screen::render(frame, &[]);
        let max_row = rows.iter().map(|(r, _, _)| *r as usize - 1).max().unwrap();
        prop_assert_eq!(screen.len(), max_row + 1);
        for (row, col, text) in &rows {
            let line = &screen.lines[*row as usize - 1];
            prop_assert!(line.len() >= *col as usize + text.len());
        }
    }
}

// ── Sanity on kinds ───────────────────────────────────────────────────────

#[test]
fn tokenizer_classifies_the_basic_kinds() {
    let cmds = tokenize(b"\x1b[1;1HX\x1b(B\x1bP$tmessage \"m\" e\x1b\\\x07");
    let kinds: Vec<RawKind> = cmds.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            RawKind::Csi,
            RawKind::Font,
            RawKind::Device,
            RawKind::Terminator,
            RawKind::Bell,
        ]
    );
}
