use serde::{Deserialize, Serialize};

/// Every path stored in a patch starts with this prefix.
pub const PATH_PREFIX: &str = "./";

pub const TEXT_CONTENT_TYPE: &str = "text/plain";
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// A snapshot of one file. Patches never modify a `File` they were given;
/// they hand back a new value, or `None` when the file no longer exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub path: String,
    pub contents: Vec<u8>,
    /// Hint only; does not take part in equality.
    pub content_type: String,
}

impl File {
    pub fn new(path: &str, contents: impl Into<Vec<u8>>) -> Self {
        let contents = contents.into();
        let content_type = if is_binary(&contents) {
            BINARY_CONTENT_TYPE
        } else {
            TEXT_CONTENT_TYPE
        };
        Self {
            path: normalize_path(path),
            contents,
            content_type: content_type.to_string(),
        }
    }

    pub fn is_binary(&self) -> bool {
        is_binary(&self.contents)
    }

    pub(crate) fn with_contents(&self, contents: Vec<u8>) -> Self {
        Self::new(&self.path, contents)
    }
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.contents == other.contents
    }
}

impl Eq for File {}

/// Contents holding a NUL byte or invalid UTF-8 are diffed byte-wise.
pub fn is_binary(contents: &[u8]) -> bool {
    contents.contains(&0) || std::str::from_utf8(contents).is_err()
}

/// Prefix `path` with `./` unless it already carries it. Empty stays empty.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() || path.starts_with(PATH_PREFIX) {
        path.to_string()
    } else {
        format!("{PATH_PREFIX}{}", path.trim_start_matches('/'))
    }
}

/// Replace backslash and every whitespace character with its decimal code
/// wrapped in backslashes, so a path is always a single whitespace-free
/// token. Codes below 10 are padded to two digits.
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '\\' || c.is_whitespace() {
            out.push_str(&format!("\\{:02}\\", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse of [`escape_path`]: every `\DD\` (two or more decimal digits)
/// becomes the character with that code point.
pub fn unescape_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(path.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some((c, consumed)) = escaped_char(&bytes[i + 1..]) {
                out.push(c);
                i += consumed + 1;
                continue;
            }
        }
        // Multi-byte characters are copied through untouched.
        let ch = path[i..].chars().next().unwrap_or('\\');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Longest decimal code point, `1114111`.
const MAX_CODE_DIGITS: usize = 7;

fn escaped_char(rest: &[u8]) -> Option<(char, usize)> {
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if !(2..=MAX_CODE_DIGITS).contains(&digits) || rest.get(digits) != Some(&b'\\') {
        return None;
    }
    let code: u32 = std::str::from_utf8(&rest[..digits]).ok()?.parse().ok()?;
    Some((char::from_u32(code)?, digits + 1))
}

/// Split text into lines the way hunks count them: on `\n`, keeping a
/// trailing empty line when the text ends in a newline. Empty text is a
/// single empty line, so [`join_lines`] is an exact inverse.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

pub fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}
