use chrono::Local;

/// Local wall-clock time with millisecond precision, as used in log lines.
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Replaces every line break with `<br>`.
///
/// `\r\n` counts as a single break, lone `\r` and lone `\n` count as one each.
pub fn html_line_breaks(text: &str) -> String {
    let mut html = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                html.push_str("<br>");
            }
            '\n' => html.push_str("<br>"),
            other => html.push(other),
        }
    }
    html
}
