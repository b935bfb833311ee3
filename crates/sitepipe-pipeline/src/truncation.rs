//! Shortening of failure messages and captured command output for display.

/// Longest step message stored in a [`StepResult`](sitepipe_types::StepResult).
pub const MAX_MESSAGE_CHARS: usize = 240;

fn char_prefix(s: &str, chars: usize) -> &str {
    match s.char_indices().nth(chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn char_suffix(s: &str, chars: usize) -> &str {
    let total = s.chars().count();
    if chars >= total {
        return s;
    }
    match s.char_indices().nth(total - chars) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}

/// Keep the last `max_chars` characters of `output`, with a marker at the start.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }
    format!(
        "[... {} characters omitted ...]\n{}",
        total - max_chars,
        char_suffix(output, max_chars)
    )
}

/// The first non-empty line of `message`, cut to `max_chars`.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    let line = message
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    format!("{}...", char_prefix(line, max_chars.saturating_sub(3)))
}
