use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tripwire_runtime::Value;

/// Frames in the `at function (file:line:column)` and `at file:line:column` dialect.
static AT_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\s*at\s+
        (?:(?P<function>.+?)\s+\()?
        (?P<file>.+?):(?P<line>\d+):(?P<column>\d+)
        \)?\s*$
        ",
    )
    .unwrap()
});

/// Frames in the `function@file:line:column` dialect.
static AT_SIGN_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\s*(?P<function>[^@]*)@
        (?P<file>.+?):(?P<line>\d+):(?P<column>\d+)
        \s*$
        ",
    )
    .unwrap()
});

/// A single parsed stack frame.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Name of the function, if the frame names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// The file or URL of the script.
    pub file_name: String,
    /// Line number, starting at 1.
    pub line_number: u32,
    /// Column number, starting at 1.
    pub column_number: u32,
}

/// Parses raw stack trace text into frames.
///
/// The first line is the error header and always skipped, followed by `skip_frames` further lines.
/// Each remaining line is matched against both supported dialects independently. Lines that match
/// neither are skipped.
///
/// # Example
///
/// ```
/// use tripwire_snapshot::parse_stack;
///
/// let frames = parse_stack("Error\n    at foo (http://x/y.js:10:5)", 0);
/// assert_eq!(frames[0].function.as_deref(), Some("foo"));
/// assert_eq!(frames[0].line_number, 10);
/// ```
pub fn parse_stack(stack: &str, skip_frames: usize) -> Vec<StackFrame> {
    stack
        .lines()
        .skip(1 + skip_frames)
        .filter_map(parse_frame)
        .collect()
}

/// Parses the `stack` property of an error value.
///
/// Returns no frames if the value has no string `stack` data property.
pub fn parse_error_stack(error: &Value, skip_frames: usize) -> Vec<StackFrame> {
    match error.get_data_property("stack") {
        Some(Value::String(stack)) => parse_stack(&stack, skip_frames),
        _ => Vec::new(),
    }
}

fn parse_frame(line: &str) -> Option<StackFrame> {
    let captures = AT_FRAME
        .captures(line)
        .or_else(|| AT_SIGN_FRAME.captures(line))?;
    frame_from_captures(&captures)
}

fn frame_from_captures(captures: &Captures<'_>) -> Option<StackFrame> {
    let function = captures
        .name("function")
        .map(|m| m.as_str().trim())
        .filter(|function| !function.is_empty())
        .map(str::to_owned);

    Some(StackFrame {
        function,
        file_name: captures.name("file")?.as_str().to_owned(),
        line_number: captures.name("line")?.as_str().parse().ok()?,
        column_number: captures.name("column")?.as_str().parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use tripwire_runtime::Object;

    use super::*;

    fn frame(function: Option<&str>, file: &str, line: u32, column: u32) -> StackFrame {
        StackFrame {
            function: function.map(str::to_owned),
            file_name: file.to_owned(),
            line_number: line,
            column_number: column,
        }
    }

    #[test]
    fn test_at_dialect() {
        let frames = parse_stack("Error\n    at foo (http://x/y.js:10:5)", 0);
        assert_eq!(frames, vec![frame(Some("foo"), "http://x/y.js", 10, 5)]);
    }

    #[test]
    fn test_at_dialect_anonymous() {
        let stack = "Error: boom\n    at http://x/app.js:1:20\n    at new Widget (http://x/w.js:4:2)";
        assert_eq!(
            parse_stack(stack, 0),
            vec![
                frame(None, "http://x/app.js", 1, 20),
                frame(Some("new Widget"), "http://x/w.js", 4, 2),
            ]
        );
    }

    #[test]
    fn test_at_sign_dialect() {
        let stack = "header\nhandleClick@http://x/app.js:12:9\n@http://x/app.js:30:1";
        assert_eq!(
            parse_stack(stack, 0),
            vec![
                frame(Some("handleClick"), "http://x/app.js", 12, 9),
                frame(None, "http://x/app.js", 30, 1),
            ]
        );
    }

    #[test]
    fn test_skip_frames() {
        let stack = "Error\n    at own (a.js:1:1)\n    at caller (b.js:2:2)";
        assert_eq!(
            parse_stack(stack, 1),
            vec![frame(Some("caller"), "b.js", 2, 2)]
        );
        assert!(parse_stack(stack, 5).is_empty());
    }

    #[test]
    fn test_unmatched_lines_are_skipped() {
        let stack = "Error\n    at native code\n    garbage\n    at ok (c.js:3:4)";
        assert_eq!(parse_stack(stack, 0), vec![frame(Some("ok"), "c.js", 3, 4)]);
    }

    #[test]
    fn test_parse_error_stack() {
        let error = Object::error("Error", "x");
        error.set("stack", "Error: x\n    at f (d.js:5:6)");
        assert_eq!(
            parse_error_stack(&error.into(), 0),
            vec![frame(Some("f"), "d.js", 5, 6)]
        );
        assert!(parse_error_stack(&Value::Null, 0).is_empty());
    }
}
