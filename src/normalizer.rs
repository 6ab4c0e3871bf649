//! Cleanup of raw generated text before it is shown and spoken.
//!
//! Generated text arrives with Markdown emphasis markers and blank
//! spacer lines. We strip the markers and number the remaining lines.

/// Remove every `*` emphasis marker and trim surrounding whitespace.
pub fn sanitize(text: &str) -> String {
    text.replace("***", "").replace('*', "").trim().to_string()
}

/// Render non-blank lines as a 1-based numbered list.
pub fn format_as_list(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| format!("{}. {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sanitize then list-format generated text. Never fails.
pub fn normalize(raw: &str) -> String {
    format_as_list(&sanitize(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markers_and_numbers_lines() {
        assert_eq!(normalize("**Hello**\n\nWorld"), "1. Hello\n2. World");
    }

    #[test]
    fn strips_triple_asterisk_runs() {
        assert_eq!(sanitize("***Title***  "), "Title");
        assert_eq!(sanitize("a * b ** c"), "a  b  c");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("  \n\n ** \n"), "");
    }

    #[test]
    fn drops_whitespace_only_lines_and_trims_kept_ones() {
        let raw = "  first  \n   \n\tsecond\r\n\nthird";
        assert_eq!(normalize(raw), "1. first\n2. second\n3. third");
    }

    #[test]
    fn renumbering_own_output_keeps_structure() {
        let once = normalize("* one\n* two\n\n* three");
        assert_eq!(once, "1. one\n2. two\n3. three");

        let twice = normalize(&once);
        assert_eq!(twice, "1. 1. one\n2. 2. two\n3. 3. three");
        assert_eq!(twice.lines().count(), once.lines().count());
    }
}
