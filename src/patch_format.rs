//! Text form of a named patch, optionally gzip-wrapped.
//!
//! ```text
//! [<name>
//! <author>*<'*' or '-'><YYYYMMDDHHMMSS>
//!  <comment line>
//! ] {
//! <primitive block>
//! }
//! ```
//! Without a comment the closing `]` follows the date on the same line.

use std::io::{Read, Write};

use chrono::{NaiveDate, NaiveDateTime};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::ParseError;
use crate::patch::{Patch, PatchInfo};
use crate::primitive::{PrimitivePatch, TOKENS};

pub const DATE_FORMAT: &str = "%Y%m%d%H%M%S";
pub const DATE_WIDTH: usize = 14;

pub fn render(patch: &Patch) -> String {
    let blocks: Vec<String> = patch.patches().iter().map(PrimitivePatch::to_text).collect();
    format!("{} {{\n{}\n}}\n", render_header(patch.info()), blocks.join("\n"))
}

fn render_header(info: &PatchInfo) -> String {
    let mut out = format!(
        "[{}\n{}*{}{}",
        info.name,
        info.author,
        if info.inverted { '-' } else { '*' },
        info.date_string()
    );
    if let Some(comment) = &info.comment {
        out.push('\n');
        for line in comment.split('\n') {
            out.push(' ');
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push(']');
    out
}

pub fn parse(text: &str) -> Result<Patch, ParseError> {
    let fail = |message: &str, fragment: &str| ParseError::new(message, fragment);

    let text = text.trim_start();
    let rest = text
        .strip_prefix('[')
        .ok_or_else(|| fail("patch must start with '['", first_line(text)))?;
    let (name, rest) = rest
        .split_once('\n')
        .ok_or_else(|| fail("missing author line", rest))?;
    let (details, mut rest) = rest.split_once('\n').unwrap_or((rest, ""));

    let (author, flagged) = details
        .split_once('*')
        .ok_or_else(|| fail("missing '*' after author", details))?;
    let inverted = match flagged.chars().next() {
        Some('-') => true,
        Some('*') => false,
        _ => return Err(fail("expected '*' or '-' before the date", details)),
    };
    let stamp = &flagged[1..];
    let date = stamp
        .get(..DATE_WIDTH)
        .and_then(parse_date)
        .ok_or_else(|| fail("expected a 14-digit date", details))?;
    let tail = &stamp[DATE_WIDTH..];

    let mut comment_lines: Vec<&str> = Vec::new();
    if tail.trim_end() != "] {" {
        if !tail.is_empty() {
            return Err(fail("unexpected text after the date", details));
        }
        loop {
            let (line, remaining) = rest.split_once('\n').unwrap_or((rest, ""));
            rest = remaining;
            if let Some(comment) = line.strip_prefix(' ') {
                comment_lines.push(comment);
            } else if line.trim_end() == "] {" {
                break;
            } else {
                return Err(fail("expected a comment line or '] {'", line));
            }
            if rest.is_empty() {
                return Err(fail("patch header is not closed", details));
            }
        }
    }

    let body = rest
        .trim_end()
        .strip_suffix('}')
        .ok_or_else(|| fail("patch body is not closed with '}'", last_line(rest)))?;
    let body = body.strip_suffix('\n').unwrap_or(body);

    let patches = split_blocks(body)?
        .iter()
        .map(|block| PrimitivePatch::parse(block))
        .collect::<Result<Vec<_>, _>>()?;

    let comment = if comment_lines.is_empty() {
        None
    } else {
        Some(comment_lines.join("\n"))
    };
    let info = PatchInfo {
        author: author.to_string(),
        name: name.to_string(),
        date,
        comment,
        inverted,
    };
    info.validate()
        .map_err(|e| ParseError::new(e.to_string(), first_line(text)))?;
    Ok(Patch::from_parts(info, patches))
}

/// Group body lines into primitive blocks, each starting at a token line.
fn split_blocks(body: &str) -> Result<Vec<String>, ParseError> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in body.split('\n') {
        if starts_block(line) {
            blocks.push(vec![line]);
        } else if let Some(block) = blocks.last_mut() {
            block.push(line);
        } else if !line.trim().is_empty() {
            return Err(ParseError::new("text outside of any primitive patch", line));
        }
    }
    Ok(blocks
        .into_iter()
        .map(|mut lines| {
            while lines.len() > 1 && lines.last().is_some_and(|l| l.trim().is_empty()) {
                lines.pop();
            }
            lines.join("\n")
        })
        .collect())
}

fn starts_block(line: &str) -> bool {
    TOKENS.iter().any(|token| {
        line.strip_prefix(token)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
    })
}

pub fn parse_date(digits: &str) -> Option<NaiveDateTime> {
    if digits.len() != DATE_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| digits[range].parse::<u32>().ok();
    let year = digits[0..4].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?
        .and_hms_opt(field(8..10)?, field(10..12)?, field(12..14)?)
}

/// Parse patch file contents, gzip-compressed or plain.
pub fn parse_bytes(bytes: &[u8]) -> Result<Patch, ParseError> {
    match inflate(bytes) {
        Ok(text) => parse(&text),
        Err(_) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| ParseError::new("patch is neither gzip nor UTF-8 text", ""))?;
            parse(text)
        }
    }
}

pub fn deflate(text: &str) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    encoder.finish()
}

pub fn inflate(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}

fn first_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or_default()
}

fn last_line(text: &str) -> &str {
    text.trim_end().rsplit('\n').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{AddFile, Binary, Hunk, Move, RmFile};

    fn info(comment: Option<&str>) -> PatchInfo {
        PatchInfo {
            author: "jane@example.org".to_string(),
            name: "Fix the frobnicator".to_string(),
            date: parse_date("20240102030405").unwrap(),
            comment: comment.map(str::to_string),
            inverted: false,
        }
    }

    fn sample(comment: Option<&str>) -> Patch {
        Patch::from_parts(
            info(comment),
            vec![
                AddFile::new("new file.txt").into(),
                Hunk::new(
                    "new file.txt",
                    1,
                    vec![String::new()],
                    vec!["hello ".to_string(), "world".to_string()],
                )
                .into(),
                Move::new("a", "b").into(),
                Binary::new("img.png", 4, vec![0, 1], vec![2]).into(),
                RmFile::new("gone").into(),
            ],
        )
    }

    #[test]
    fn test_render_without_comment() {
        let text = render(&sample(None));
        assert!(text.starts_with("[Fix the frobnicator\njane@example.org**20240102030405] {\n"));
        assert!(text.contains("\naddfile ./new\\32\\file.txt\nhunk ./new\\32\\file.txt 1\n-\n+hello $\n+world\nmove ./a ./b\n"));
        assert!(text.ends_with("rmfile ./gone\n}\n"));
    }

    #[test]
    fn test_render_with_comment() {
        let text = render(&sample(Some("first line\nsecond")));
        assert!(text.starts_with(
            "[Fix the frobnicator\njane@example.org**20240102030405\n first line\n second\n] {\n"
        ));
    }

    #[test]
    fn test_round_trip() {
        for comment in [None, Some("why\n\nbecause")] {
            let patch = sample(comment);
            assert_eq!(parse(&render(&patch)).unwrap(), patch);
        }
    }

    #[test]
    fn test_inverted_flag() {
        let mut patch_info = info(None);
        patch_info.inverted = true;
        let patch = Patch::from_parts(patch_info, vec![RmFile::new("x").into()]);
        let text = render(&patch);
        assert!(text.contains("jane@example.org*-20240102030405]"));
        assert!(parse(&text).unwrap().info().inverted);
    }

    #[test]
    fn test_empty_body() {
        let patch = Patch::from_parts(info(None), Vec::new());
        let text = render(&patch);
        assert!(text.ends_with("] {\n\n}\n"));
        assert!(parse(&text).unwrap().patches().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("no bracket").is_err());
        assert!(parse("[name\nauthor**2024] {\n}\n").is_err());
        assert!(parse("[name\nauthor*x20240102030405] {\n}\n").is_err());
        assert!(parse("[name\nauthor**20240102030405] {\naddfile ./a\n").is_err());
        assert!(parse("[name\nauthor**20240102030405] {\nbogus line\n}\n").is_err());
        assert!(parse("[name\nauthor**20241399030405] {\n}\n").is_err());
        let err = parse("[name\nauthor**20240102030405] {\nhunk ./a 1\n*x\n}\n").unwrap_err();
        assert_eq!(err.fragment, "*x");
    }

    #[test]
    fn test_gzip_and_plain_both_parse() {
        let patch = sample(Some("zipped"));
        let text = render(&patch);
        let zipped = deflate(&text).unwrap();
        assert_ne!(zipped, text.as_bytes());
        assert_eq!(parse_bytes(&zipped).unwrap(), patch);
        assert_eq!(parse_bytes(text.as_bytes()).unwrap(), patch);
        assert_eq!(inflate(&zipped).unwrap(), text);
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("19991231235959").unwrap();
        assert_eq!(date.format(DATE_FORMAT).to_string(), "19991231235959");
        assert!(parse_date("1999123123595").is_none());
        assert!(parse_date("1999123123595x").is_none());
    }
}
