//! Markdown to heading-scoped plain-text sections.
//!
//! Front matter is dropped, fenced code keeps its content but loses the fence
//! markers, and link/emphasis syntax is reduced to its visible text. Lines that
//! look like headings inside a fence are treated as code.

use regex::Regex;
use std::sync::LazyLock;

static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("static regex"));
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("static regex"));
// Only real HTML tags; `<pod-name>` style placeholders are runbook content.
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:a|b|br|code|details|div|em|i|img|kbd|li|ol|p|pre|span|strong|sub|summary|sup|table|td|th|tr|ul)\b[^>]*>")
        .expect("static regex")
});
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\*\*|__)([^*_]+)(\*\*|__)").expect("static regex"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("static regex"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[-*+][ \t]+").expect("static regex"));
static NUMBERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\d+\.[ \t]+").expect("static regex"));
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading_path: Vec<String>,
    pub text: String,
}

/// Split raw markdown at heading boundaries.
///
/// Every section's text starts with its own heading title. A heading with no
/// body before the next heading produces no section of its own; its title
/// still appears in the `heading_path` of its subsections.
pub fn split_sections(raw: &str) -> Vec<Section> {
    let body = strip_front_matter(raw);
    let mut sections = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut current = String::new();
    let mut has_body = false;
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            if let Some((level, title)) = parse_heading(line) {
                flush(&mut sections, &stack, &mut current, has_body);
                has_body = false;
                while stack.last().is_some_and(|(l, _)| *l >= level) {
                    stack.pop();
                }
                current.push_str(&title);
                current.push('\n');
                stack.push((level, title));
                continue;
            }
        }
        if !line.trim().is_empty() {
            has_body = true;
        }
        current.push_str(line);
        current.push('\n');
    }
    flush(&mut sections, &stack, &mut current, has_body);
    sections
}

fn flush(sections: &mut Vec<Section>, stack: &[(usize, String)], current: &mut String, has_body: bool) {
    if has_body {
        let text = to_plaintext(current);
        if !text.is_empty() {
            sections.push(Section { heading_path: stack.iter().map(|(_, t)| t.clone()).collect(), text });
        }
    }
    current.clear();
}

/// `# Title` through `###### Title`; returns `(level, title)`.
fn parse_heading(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() { None } else { Some((level, title.to_string())) }
}

/// Remove a leading `---` ... `---` YAML block.
pub fn strip_front_matter(raw: &str) -> &str {
    front_matter_bounds(raw).map_or(raw, |(_, end)| &raw[end..])
}

/// `title:` from the YAML front matter, quotes removed.
pub fn front_matter_title(raw: &str) -> Option<String> {
    let (start, end) = front_matter_bounds(raw)?;
    raw[start..end].lines().find_map(|line| {
        let value = line.strip_prefix("title:")?.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// First level-one heading outside of front matter and code fences.
pub fn first_h1(raw: &str) -> Option<String> {
    let mut in_fence = false;
    for line in strip_front_matter(raw).lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some((1, title)) = parse_heading(line) {
            return Some(title);
        }
    }
    None
}

fn front_matter_bounds(raw: &str) -> Option<(usize, usize)> {
    let rest = raw.strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;
    let start = raw.len() - rest.len();
    let mut offset = start;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((start, offset + line.len()));
        }
        offset += line.len();
    }
    None
}

/// Reduce markdown syntax to the text a reader would see.
pub fn to_plaintext(markdown: &str) -> String {
    let text = IMAGE.replace_all(markdown, "$1");
    let text = LINK.replace_all(&text, "$1");
    let text = HTML_TAG.replace_all(&text, "");
    let text = BOLD.replace_all(&text, "$2");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = BULLET.replace_all(&text, "- ");
    let text = NUMBERED.replace_all(&text, "");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}
