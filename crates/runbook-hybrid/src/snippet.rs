use std::collections::HashSet;

const ELLIPSIS: &str = "...";

/// Builds short, HTML-safe previews of chunk text.
///
/// Lexical matches get the window of `window_words` words holding the most
/// query terms, with each matched term wrapped in `<mark>`. Everything else
/// (including vector-only matches) gets the leading words of the chunk.
/// Visible text is capped at `max_chars` before escaping.
#[derive(Debug, Clone, Copy)]
pub struct SnippetBuilder {
    window_words: usize,
    max_chars: usize,
}

impl Default for SnippetBuilder {
    fn default() -> Self {
        Self { window_words: 50, max_chars: 300 }
    }
}

impl SnippetBuilder {
    pub fn new(window_words: usize, max_chars: usize) -> Self {
        Self { window_words: window_words.max(1), max_chars: max_chars.max(1) }
    }

    /// `terms` are analyzer output (lowercase); pass an empty set for a plain lead snippet.
    pub fn build(&self, text: &str, terms: &HashSet<String>) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return String::new();
        }
        let start = if terms.is_empty() { 0 } else { self.best_window(&words, terms) };
        let end = (start + self.window_words).min(words.len());

        let mut out = String::new();
        if start > 0 {
            out.push_str(ELLIPSIS);
        }
        let mut visible = 0;
        let mut truncated = false;
        for (i, word) in words[start..end].iter().enumerate() {
            let sep = usize::from(i > 0);
            let len = word.chars().count();
            if visible + sep + len > self.max_chars {
                if i == 0 {
                    let head: String = word.chars().take(self.max_chars).collect();
                    out.push_str(&highlight(&head, terms));
                }
                truncated = true;
                break;
            }
            if sep == 1 {
                out.push(' ');
            }
            out.push_str(&highlight(word, terms));
            visible += sep + len;
        }
        if truncated || end < words.len() {
            out.push_str(ELLIPSIS);
        }
        out
    }

    /// Earliest window start with the most matching words.
    fn best_window(&self, words: &[&str], terms: &HashSet<String>) -> usize {
        let matches: Vec<usize> = words.iter().map(|w| usize::from(word_matches(w, terms))).collect();
        let width = self.window_words.min(words.len());
        let mut count: usize = matches[..width].iter().sum();
        let (mut best, mut best_count) = (0, count);
        for start in 1..=(words.len() - width) {
            count = count + matches[start + width - 1] - matches[start - 1];
            if count > best_count {
                best = start;
                best_count = count;
            }
        }
        if best_count == 0 { 0 } else { best }
    }
}

fn word_matches(word: &str, terms: &HashSet<String>) -> bool {
    word.split(|c: char| !c.is_alphanumeric())
        .filter(|seg| !seg.is_empty())
        .any(|seg| terms.contains(&seg.to_lowercase()))
}

/// Escape the word and wrap each alphanumeric run that is a query term.
fn highlight(word: &str, terms: &HashSet<String>) -> String {
    let mut out = String::with_capacity(word.len());
    let mut run = String::new();
    for c in word.chars() {
        if c.is_alphanumeric() {
            run.push(c);
            continue;
        }
        flush_run(&mut out, &mut run, terms);
        escape_into(&mut out, c);
    }
    flush_run(&mut out, &mut run, terms);
    out
}

fn flush_run(out: &mut String, run: &mut String, terms: &HashSet<String>) {
    if run.is_empty() {
        return;
    }
    if terms.contains(&run.to_lowercase()) {
        out.push_str("<mark>");
        out.push_str(run);
        out.push_str("</mark>");
    } else {
        out.push_str(run);
    }
    run.clear();
}

fn escape_into(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#39;"),
        _ => out.push(c),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        escape_into(&mut out, c);
    }
    out
}
