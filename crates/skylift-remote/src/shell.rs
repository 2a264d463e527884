//! Remote shell command construction.

use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Longest output tail carried in errors and records.
pub const OUTPUT_TAIL_BYTES: usize = 2048;

/// Quote `value` for a POSIX shell.
pub fn quote(value: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(value)).into_owned()
}

/// Command that writes `content` to `path`, creating the parent
/// directory. The content travels base64-encoded so it never reaches the
/// shell parser.
pub fn write_file_command(path: &str, content: &str) -> String {
    let encoded = STANDARD.encode(content.as_bytes());
    let parent = match path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir,
        _ => ".",
    };
    format!(
        "mkdir -p {} && echo '{encoded}' | base64 -d > {}",
        quote(parent),
        quote(path)
    )
}

/// Last `OUTPUT_TAIL_BYTES` of `text`, cut on a char boundary.
pub fn tail(text: &str) -> String {
    let text = text.trim_end();
    if text.len() <= OUTPUT_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - OUTPUT_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}

/// First word of a command, for log and error labels.
pub fn label(command: &str) -> String {
    let mut words = command.split_whitespace();
    match (words.next(), words.next()) {
        (Some(a), Some(b)) => format!("{a} {b}"),
        (Some(a), None) => a.to_string(),
        _ => String::new(),
    }
}
