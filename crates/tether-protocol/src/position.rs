//! Source positions reported by the debugger.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// A stopped location in the debugged program.
///
/// `line` is 1-based, as printed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePosition {
    /// Absolute path of the source file, as reported by pdb.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// Function or method name, e.g. `<module>()` or `main()`.
    pub method: String,
}

impl CodePosition {
    /// Parse a stack marker line of the shape
    /// `> /path/to/file.py(3)<module>()`.
    ///
    /// The sentinel prefix and any trailing newline must already be
    /// stripped. Paths may themselves contain parentheses; the line number
    /// is taken from the last parenthesized integer, matching how pdb
    /// renders frames.
    pub fn parse(line: &str) -> Option<Self> {
        static MARKER: OnceLock<Regex> = OnceLock::new();
        let marker = MARKER
            .get_or_init(|| Regex::new(r"^> (.*)\((\d+)\)(.*)$").expect("valid marker regex"));
        let caps = marker.captures(line.trim_end())?;
        let line_number: u32 = caps[2].parse().ok()?;
        Some(Self {
            file: caps[1].to_string(),
            line: line_number,
            method: caps[3].to_string(),
        })
    }
}

impl fmt::Display for CodePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.file, self.line, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_parse_module_frame() {
        let pos = CodePosition::parse("> /tmp/script.py(3)<module>()").unwrap();
        assert_eq!(pos.file, "/tmp/script.py");
        assert_eq!(pos.line, 3);
        assert_eq!(pos.method, "<module>()");
    }

    #[test]
    fn position_parse_function_frame_with_arrow_suffix() {
        let pos = CodePosition::parse("> /tmp/script.py(12)main()->None").unwrap();
        assert_eq!(pos.line, 12);
        assert_eq!(pos.method, "main()->None");
    }

    #[test]
    fn position_parse_path_with_parentheses() {
        let pos = CodePosition::parse("> /tmp/dir (copy)/script.py(7)f()").unwrap();
        assert_eq!(pos.file, "/tmp/dir (copy)/script.py");
        assert_eq!(pos.line, 7);
        assert_eq!(pos.method, "f()");
    }

    #[test]
    fn position_parse_strips_trailing_newline() {
        let pos = CodePosition::parse("> /tmp/script.py(1)<module>()\n").unwrap();
        assert_eq!(pos.line, 1);
    }

    #[test]
    fn position_parse_rejects_non_marker() {
        assert!(CodePosition::parse("Breakpoint 1 at /tmp/script.py:3").is_none());
        assert!(CodePosition::parse("> /tmp/script.py no line").is_none());
    }

    #[test]
    fn position_display() {
        let pos = CodePosition {
            file: "/tmp/script.py".into(),
            line: 3,
            method: "<module>()".into(),
        };
        assert_eq!(pos.to_string(), "/tmp/script.py:3 (<module>())");
    }
}
