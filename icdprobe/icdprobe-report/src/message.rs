//! Test-case message rendering.

/// Messages longer than this (in characters) collapse behind a summary.
pub const LONG_MESSAGE_CHARS: usize = 100;

/// HTML for one message cell: empty, inline, or a collapsible block (pretty-printed for JSON).
pub fn format_message(message: &str) -> String {
    if message.is_empty() {
        return String::new();
    }
    let unescaped = unescape_controls(message);
    let dedented = dedent(&unescaped);
    let text = dedented.trim();

    if text.starts_with('{') || text.starts_with('[') {
        if let Some(pretty) = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
        {
            return collapsible("View JSON", "message-pre message-json", &pretty);
        }
    }

    if text.contains(['\n', '\t']) || message.chars().count() > LONG_MESSAGE_CHARS {
        collapsible("View details", "message-pre", text)
    } else {
        escape_html(text)
    }
}

fn collapsible(summary: &str, class: &str, body: &str) -> String {
    format!(
        r#"<details class="message-details"><summary>{summary}</summary><pre class="{class}">{}</pre></details>"#,
        escape_html(body)
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Turns literal `\n`, `\t`, `\r` and `\\` sequences into the characters they name.
fn unescape_controls(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let replacement = match chars.peek() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('\\') => '\\',
            _ => {
                out.push(c);
                continue;
            }
        };
        chars.next();
        out.push(replacement);
    }
    out
}

/// Removes the leading whitespace shared by every non-blank line. Blank lines become empty.
fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| &line[..line.len() - line.trim_start_matches([' ', '\t']).len()])
        .reduce(common_prefix)
        .unwrap_or("");
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                &line[margin.len()..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let shared = a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count();
    &a[..shared]
}
