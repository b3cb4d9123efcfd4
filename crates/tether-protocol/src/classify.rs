//! Prefix-tolerant classification of debugger output fragments.
//!
//! The reader loop re-classifies its line buffer after every byte, so every
//! predicate here must answer "could this fragment still grow into line kind
//! X?" rather than "is this line kind X?". Each `is_partial_*` predicate
//! therefore returns `true` for the complete line, for every proper prefix of
//! it, and (for open-ended kinds) for the line followed by arbitrary text.

/// Prefix the companion pdb module puts in front of every protocol line.
///
/// The embedded control characters make accidental collisions with program
/// output effectively impossible.
pub const SENTINEL: &str = "Tether\u{19}Pdb\u{15}";

/// The prompt printed whenever pdb is waiting for a command. Never
/// newline-terminated, which is why fragment classification exists at all.
pub const PROMPT: &str = "(Pdb) ";

const DONE_BANNER: &str = "The program finished and will be restarted\n";
const POST_MORTEM_BANNER: &str = "Uncaught exception. Entering post mortem debugging\n";
const CALL_MARKER: &str = "--Call--\n";
const RETURN_MARKER: &str = "--Return--\n";
const BLANK_OR_COMMENT: &str = "*** Blank or comment\n";

/// Builtin exception names pdb prints when the debugged program raises.
/// Matched on the stream without a sentinel prefix because the interpreter,
/// not the wrapper, prints them.
const EXCEPTION_NAMES: &[&str] = &[
    "ArithmeticError:",
    "AssertionError:",
    "AttributeError:",
    "BufferError:",
    "EOFError:",
    "Exception:",
    "FileExistsError:",
    "FileNotFoundError:",
    "FloatingPointError:",
    "ImportError:",
    "IndentationError:",
    "IndexError:",
    "KeyError:",
    "LookupError:",
    "MemoryError:",
    "ModuleNotFoundError:",
    "NameError:",
    "NotImplementedError:",
    "OSError:",
    "OverflowError:",
    "RecursionError:",
    "ReferenceError:",
    "RuntimeError:",
    "StopAsyncIteration:",
    "StopIteration:",
    "SyntaxError:",
    "SystemError:",
    "TabError:",
    "TypeError:",
    "UnboundLocalError:",
    "UnicodeDecodeError:",
    "UnicodeEncodeError:",
    "UnicodeError:",
    "UnicodeTranslateError:",
    "ValueError:",
    "ZeroDivisionError:",
];

/// True when `fragment` is a prefix of `SENTINEL` followed by exactly
/// `suffix` (a closed line shape, e.g. a banner).
fn partial_closed(fragment: &str, suffix: &str) -> bool {
    match fragment.strip_prefix(SENTINEL) {
        Some(rest) => suffix.starts_with(rest),
        None => SENTINEL.starts_with(fragment),
    }
}

/// True when `fragment` is a prefix of `SENTINEL` followed by `intro` and
/// then arbitrary further text (an open-ended line shape).
fn partial_open(fragment: &str, intro: &str) -> bool {
    match fragment.strip_prefix(SENTINEL) {
        Some(rest) => rest.starts_with(intro) || intro.starts_with(rest),
        None => SENTINEL.starts_with(fragment),
    }
}

/// The fragment is exactly the sentinel-prefixed prompt.
pub fn is_prompt(fragment: &str) -> bool {
    fragment.strip_prefix(SENTINEL) == Some(PROMPT)
}

/// The fragment could still grow into the prompt.
pub fn is_partial_prompt(fragment: &str) -> bool {
    partial_closed(fragment, PROMPT)
}

/// The fragment could be a breakpoint confirmation
/// (`Breakpoint 1 at /path/to/file.py:3`).
pub fn is_partial_breakpoint(fragment: &str) -> bool {
    partial_open(fragment, "Breakpoint ")
}

/// The fragment could be a stack marker line carrying the current position
/// (`> /path/to/file.py(3)<module>()`).
pub fn is_partial_code_position(fragment: &str) -> bool {
    partial_open(fragment, "> ")
}

/// The fragment could be a source echo line (`-> x = f(y)`), which pdb
/// prints after every stop and which carries no information for us.
pub fn is_partial_source_echo(fragment: &str) -> bool {
    partial_open(fragment, "-> ")
}

/// The fragment could be a pdb diagnostic line (`*** ...`), including the
/// invalid-breakpoint-location report.
pub fn is_partial_diagnostic(fragment: &str) -> bool {
    partial_open(fragment, "*** ")
}

/// The fragment could be the invalid-breakpoint-location report.
pub fn is_partial_blank_or_comment(fragment: &str) -> bool {
    partial_closed(fragment, BLANK_OR_COMMENT)
}

/// The fragment could be the normal-termination banner.
pub fn is_partial_done(fragment: &str) -> bool {
    partial_closed(fragment, DONE_BANNER)
}

/// The fragment could be the post-mortem banner printed after an uncaught
/// exception escapes the debugged program.
pub fn is_partial_post_mortem(fragment: &str) -> bool {
    partial_closed(fragment, POST_MORTEM_BANNER)
}

/// The fragment could be an exception report (`ValueError: ...`).
/// Matched with or without the sentinel: the interpreter prints bare
/// reports, while the wrapped pdb relays them through its marked stream.
pub fn is_partial_exception(fragment: &str) -> bool {
    let bytes = match fragment.strip_prefix(SENTINEL) {
        Some(rest) => rest.as_bytes(),
        None => fragment.as_bytes(),
    };
    EXCEPTION_NAMES.iter().any(|name| {
        let name = name.as_bytes();
        let n = bytes.len().min(name.len());
        bytes[..n] == name[..n]
    })
}

/// Protocol lines that are consumed without any effect on session state:
/// partial prompts, call/return markers, source echoes, and the
/// blank-or-comment report outside of breakpoint confirmation.
pub fn is_ignorable(fragment: &str) -> bool {
    is_partial_prompt(fragment)
        || partial_closed(fragment, CALL_MARKER)
        || partial_closed(fragment, RETURN_MARKER)
        || is_partial_source_echo(fragment)
        || is_partial_blank_or_comment(fragment)
}

/// The fragment could still turn out to be any protocol line at all. Once
/// this returns `false` for a growing line buffer, the rest of the line is
/// program output and can be streamed through immediately.
pub fn is_partial_protocol(fragment: &str) -> bool {
    let sentinel_shaped = match fragment.strip_prefix(SENTINEL) {
        Some(_) => true,
        None => SENTINEL.starts_with(fragment),
    };
    sentinel_shaped || is_partial_exception(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes(line: &str) -> impl Iterator<Item = &str> {
        // All lines under test are ASCII plus the sentinel control bytes,
        // so every byte index is a char boundary.
        (1..=line.len()).map(move |i| &line[..i])
    }

    #[test]
    fn prompt_exact_match_only() {
        let prompt = format!("{SENTINEL}(Pdb) ");
        assert!(is_prompt(&prompt));
        assert!(!is_prompt(&prompt[..prompt.len() - 1]));
        assert!(!is_prompt("(Pdb) "));
    }

    #[test]
    fn partial_prompt_accepts_every_prefix() {
        let prompt = format!("{SENTINEL}(Pdb) ");
        for p in prefixes(&prompt) {
            assert!(is_partial_prompt(p), "rejected prefix {p:?}");
        }
    }

    #[test]
    fn partial_prompt_rejects_overrun_and_divergence() {
        assert!(!is_partial_prompt(&format!("{SENTINEL}(Pdb) x")));
        assert!(!is_partial_prompt(&format!("{SENTINEL}(Qdb")));
        assert!(!is_partial_prompt("Tex"));
    }

    #[test]
    fn partial_breakpoint_open_ended() {
        let line = format!("{SENTINEL}Breakpoint 1 at /tmp/t.py:3\n");
        for p in prefixes(&line) {
            assert!(is_partial_breakpoint(p), "rejected prefix {p:?}");
        }
        assert!(!is_partial_breakpoint(&format!("{SENTINEL}Broken")));
    }

    #[test]
    fn partial_code_position_open_ended() {
        let line = format!("{SENTINEL}> /tmp/t.py(3)<module>()\n");
        for p in prefixes(&line) {
            assert!(is_partial_code_position(p), "rejected prefix {p:?}");
        }
        assert!(!is_partial_code_position(&format!("{SENTINEL}< nope")));
    }

    #[test]
    fn banners_accept_prefixes_and_reject_overrun() {
        let done = format!("{SENTINEL}The program finished and will be restarted\n");
        for p in prefixes(&done) {
            assert!(is_partial_done(p), "rejected prefix {p:?}");
        }
        assert!(!is_partial_done(&format!("{done}x")));

        let pm = format!("{SENTINEL}Uncaught exception. Entering post mortem debugging\n");
        for p in prefixes(&pm) {
            assert!(is_partial_post_mortem(p), "rejected prefix {p:?}");
        }
    }

    #[test]
    fn exception_matches_common_prefix() {
        assert!(is_partial_exception("Value"));
        assert!(is_partial_exception("ValueError:"));
        assert!(is_partial_exception("ValueError: bad input\n"));
        assert!(is_partial_exception(&format!("{SENTINEL}KeyError: 'x'\n")));
        assert!(!is_partial_exception("Values:"));
        assert!(!is_partial_exception("hello"));
    }

    #[test]
    fn ignorable_covers_markers_and_echoes() {
        assert!(is_ignorable(&format!("{SENTINEL}--Call--\n")));
        assert!(is_ignorable(&format!("{SENTINEL}--Return--\n")));
        assert!(is_ignorable(&format!("{SENTINEL}-> x = 1\n")));
        assert!(is_ignorable(&format!("{SENTINEL}*** Blank or comment\n")));
        assert!(is_ignorable(&format!("{SENTINEL}(Pdb) ")));
        assert!(!is_ignorable("plain program output\n"));
    }

    #[test]
    fn diagnostic_lines_are_recognized() {
        let line = format!("{SENTINEL}*** The specified object is not a function\n");
        for p in prefixes(&line) {
            assert!(is_partial_diagnostic(p), "rejected prefix {p:?}");
        }
    }

    #[test]
    fn partial_protocol_tracks_sentinel_and_exceptions() {
        assert!(is_partial_protocol("T"));
        assert!(is_partial_protocol("Tether"));
        assert!(is_partial_protocol(SENTINEL));
        assert!(is_partial_protocol(&format!("{SENTINEL}anything at all")));
        assert!(is_partial_protocol("KeyErr"));
        assert!(!is_partial_protocol("hello world"));
        assert!(!is_partial_protocol("Trouble"));
    }
}
