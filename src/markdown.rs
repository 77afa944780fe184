//! Minimal markdown handling for assistant answers.
//!
//! Answers are split into a fixed set of block kinds that the UI knows how to
//! draw. [`strip_markdown`] produces the plain text handed to speech output.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Bold(String),
    Italic(String),
    Code(String),
    Link { text: String, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<Inline>),
    Heading { level: u8, content: Vec<Inline> },
    ListItem(Vec<Inline>),
    Code { language: Option<String>, lines: Vec<String> },
    Blockquote(Vec<Inline>),
}

struct StripPatterns {
    heading: Regex,
    link: Regex,
}

fn strip_patterns() -> &'static StripPatterns {
    static PATTERNS: OnceLock<StripPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| StripPatterns {
        heading: Regex::new(r"#{1,6}\s").expect("valid heading pattern"),
        link: Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid link pattern"),
    })
}

/// Remove emphasis, heading markers, link syntax and code ticks.
pub fn strip_markdown(text: &str) -> String {
    let patterns = strip_patterns();

    let text = text.replace("**", "").replace('*', "");
    let text = patterns.heading.replace_all(&text, "");
    let text = patterns.link.replace_all(&text, "$1");
    text.replace('`', "")
}

/// Split text into blocks. Consecutive lines of a paragraph or quote are
/// joined; blank lines and fences end them.
pub fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut quote: Vec<&str> = Vec::new();
    let mut code: Option<(Option<String>, Vec<String>)> = None;

    for line in text.lines() {
        if let Some((language, lines)) = code.as_mut() {
            if line.trim_start().starts_with("```") {
                blocks.push(Block::Code {
                    language: language.take(),
                    lines: std::mem::take(lines),
                });
                code = None;
            } else {
                lines.push(line.to_string());
            }
            continue;
        }

        let trimmed = line.trim();

        if let Some(info) = trimmed.strip_prefix("```") {
            flush(&mut blocks, &mut paragraph, &mut quote);
            let language = Some(info.trim().to_string()).filter(|l| !l.is_empty());
            code = Some((language, Vec::new()));
        } else if trimmed.is_empty() {
            flush(&mut blocks, &mut paragraph, &mut quote);
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            if !paragraph.is_empty() {
                flush(&mut blocks, &mut paragraph, &mut Vec::new());
            }
            quote.push(rest.trim());
        } else if let Some((level, rest)) = heading(trimmed) {
            flush(&mut blocks, &mut paragraph, &mut quote);
            blocks.push(Block::Heading {
                level,
                content: parse_inline(rest),
            });
        } else if let Some(rest) = list_item(trimmed) {
            flush(&mut blocks, &mut paragraph, &mut quote);
            blocks.push(Block::ListItem(parse_inline(rest)));
        } else {
            if !quote.is_empty() {
                flush(&mut blocks, &mut Vec::new(), &mut quote);
            }
            paragraph.push(trimmed);
        }
    }

    // Unterminated fence keeps its content.
    if let Some((language, lines)) = code {
        blocks.push(Block::Code { language, lines });
    }
    flush(&mut blocks, &mut paragraph, &mut quote);

    blocks
}

fn flush(blocks: &mut Vec<Block>, paragraph: &mut Vec<&str>, quote: &mut Vec<&str>) {
    if !paragraph.is_empty() {
        blocks.push(Block::Paragraph(parse_inline(&paragraph.join(" "))));
        paragraph.clear();
    }
    if !quote.is_empty() {
        blocks.push(Block::Blockquote(parse_inline(&quote.join(" "))));
        quote.clear();
    }
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&level) {
        let rest = &line[level..];
        if rest.starts_with(' ') {
            return Some((level as u8, rest.trim()));
        }
    }
    None
}

fn list_item(line: &str) -> Option<&str> {
    if let Some(rest) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("+ "))
    {
        return Some(rest);
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest);
        }
    }
    None
}

/// Parse `**bold**`, `*italic*`, `` `code` `` and `[text](url)` spans.
/// Unclosed markers are kept as literal text.
pub fn parse_inline(text: &str) -> Vec<Inline> {
    let mut spans = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        let parsed = match c {
            '*' if chars.get(i + 1) == Some(&'*') && opens(&chars, i + 2) => {
                delimited(&chars, i + 2, "**").map(|(inner, next)| (Inline::Bold(inner), next))
            }
            '*' if opens(&chars, i + 1) => {
                delimited(&chars, i + 1, "*").map(|(inner, next)| (Inline::Italic(inner), next))
            }
            '`' => delimited(&chars, i + 1, "`").map(|(inner, next)| (Inline::Code(inner), next)),
            '[' => link(&chars, i),
            _ => None,
        };

        match parsed {
            Some((span, next)) => {
                if !current.is_empty() {
                    spans.push(Inline::Text(std::mem::take(&mut current)));
                }
                spans.push(span);
                i = next;
            }
            None => {
                current.push(c);
                i += 1;
            }
        }
    }

    if !current.is_empty() {
        spans.push(Inline::Text(current));
    }

    spans
}

/// Emphasis only opens before non-whitespace.
fn opens(chars: &[char], at: usize) -> bool {
    chars.get(at).is_some_and(|c| !c.is_whitespace())
}

/// Find `close` starting at `start`; returns the non-empty inner text and
/// the index after the closing marker.
fn delimited(chars: &[char], start: usize, close: &str) -> Option<(String, usize)> {
    let close: Vec<char> = close.chars().collect();
    let mut j = start;

    while j + close.len() <= chars.len() {
        if chars[j..j + close.len()] == close[..] {
            if j == start {
                return None;
            }
            return Some((chars[start..j].iter().collect(), j + close.len()));
        }
        j += 1;
    }
    None
}

fn link(chars: &[char], start: usize) -> Option<(Inline, usize)> {
    let (text, after_text) = delimited(chars, start + 1, "]")?;
    if chars.get(after_text) != Some(&'(') {
        return None;
    }
    let (url, next) = delimited(chars, after_text + 1, ")")?;
    Some((Inline::Link { text, url }, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> Inline {
        Inline::Text(s.to_string())
    }

    #[test]
    fn strip_removes_decoration() {
        let plain = strip_markdown(
            "## Rights\n**Article 16**: the *right* to live with dignity. See [the constitution](https://example.org) and `Art. 17`.",
        );
        assert_eq!(
            plain,
            "Rights\nArticle 16: the right to live with dignity. See the constitution and Art. 17."
        );
    }

    #[test]
    fn strip_leaves_plain_text_alone() {
        assert_eq!(strip_markdown("Nothing to do here."), "Nothing to do here.");
    }

    #[test]
    fn inline_spans() {
        assert_eq!(
            parse_inline("a **b** *c* `d` [e](f)"),
            vec![
                text("a "),
                Inline::Bold("b".into()),
                text(" "),
                Inline::Italic("c".into()),
                text(" "),
                Inline::Code("d".into()),
                text(" "),
                Inline::Link {
                    text: "e".into(),
                    url: "f".into()
                },
            ]
        );
    }

    #[test]
    fn unclosed_markers_stay_literal() {
        assert_eq!(parse_inline("5 * 3 and **open"), vec![text("5 * 3 and **open")]);
        assert_eq!(parse_inline("[not a link] (x)"), vec![text("[not a link] (x)")]);
    }

    #[test]
    fn blocks_of_every_kind() {
        let blocks = parse_blocks(
            "# Title\n\nFirst line\nsecond line\n\n> quoted\n> more\n\n- item one\n2. item two\n\n```rust\nlet x = 1;\n```",
        );

        assert_eq!(
            blocks,
            vec![
                Block::Heading {
                    level: 1,
                    content: vec![text("Title")]
                },
                Block::Paragraph(vec![text("First line second line")]),
                Block::Blockquote(vec![text("quoted more")]),
                Block::ListItem(vec![text("item one")]),
                Block::ListItem(vec![text("item two")]),
                Block::Code {
                    language: Some("rust".into()),
                    lines: vec!["let x = 1;".into()]
                },
            ]
        );
    }

    #[test]
    fn unterminated_fence_keeps_content() {
        assert_eq!(
            parse_blocks("```\nraw"),
            vec![Block::Code {
                language: None,
                lines: vec!["raw".into()]
            }]
        );
    }
}
