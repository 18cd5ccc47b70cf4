use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Truncates a string to max_chars characters, appending "..." if truncated.
/// Safe for UTF-8 multi-byte characters.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncate_at = max_chars.saturating_sub(3);
        let byte_index = s
            .char_indices()
            .nth(truncate_at)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        format!("{}...", &s[..byte_index])
    }
}

/// Fits a string into exactly `width` terminal columns.
///
/// Wide characters (CJK, emoji) count as two columns, so `format!("{:<w$}")`
/// would misalign them.
pub fn fit_display(s: &str, width: usize) -> String {
    if s.width() <= width {
        let padding = width - s.width();
        return format!("{}{}", s, " ".repeat(padding));
    }

    let budget = width.saturating_sub(3);
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        out.push(c);
        used += w;
    }
    let dots = width.min(3);
    out.push_str(&".".repeat(dots));
    used += dots;
    out.push_str(&" ".repeat(width.saturating_sub(used)));
    out
}
