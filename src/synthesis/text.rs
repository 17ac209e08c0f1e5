//! Markdown stripping for replies that are about to be spoken.

use std::sync::OnceLock;

use regex::Regex;

/// `(pattern, replacement)` in application order.
const RULES: &[(&str, &str)] = &[
    (r"\*\*([^*]+)\*\*", "$1"),
    (r"\*([^*]+)\*", "$1"),
    (r"`([^`]+)`", "$1"),
    (r"\[([^\]]+)\]\([^)]+\)", "$1"),
    (r"(?m)^#+\s*", ""),
    (r"(?m)^[-*]\s*", ""),
    (r"\n{2,}", ". "),
    (r"\n", " "),
];

static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

fn rules() -> &'static [(Regex, &'static str)] {
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(pattern).ok().map(|re| (re, *replacement))
            })
            .collect()
    })
}

/// Remove markdown decoration so the voice reads prose, then cap the length
/// at `max_chars` characters (an ellipsis marks the cut).
///
/// Returns an empty string when nothing speakable remains.
pub fn clean_for_speech(text: &str, max_chars: usize) -> String {
    let mut out = text.to_string();
    for (re, replacement) in rules() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    let out = out.trim();

    if out.chars().count() > max_chars {
        let cut: String = out.chars().take(max_chars).collect();
        log::warn!("synthesis: text truncated to {max_chars} chars");
        return format!("{cut}...");
    }
    out.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_rules_compile() {
        assert_eq!(rules().len(), RULES.len());
    }

    #[test]
    fn strips_inline_markup() {
        assert_eq!(
            clean_for_speech("This is **bold**, *soft* and `code`.", 100),
            "This is bold, soft and code."
        );
    }

    #[test]
    fn links_keep_their_label() {
        assert_eq!(
            clean_for_speech("See [the docs](https://example.com/x).", 100),
            "See the docs."
        );
    }

    #[test]
    fn headers_and_bullets_removed() {
        let text = "## Plan\n- first\n- second";
        assert_eq!(clean_for_speech(text, 100), "Plan first second");
    }

    #[test]
    fn paragraph_breaks_become_sentences() {
        assert_eq!(clean_for_speech("One\n\nTwo", 100), "One. Two");
    }

    #[test]
    fn long_text_is_truncated_on_char_boundary() {
        let text = "é".repeat(10);
        assert_eq!(clean_for_speech(&text, 4), "éééé...");
    }

    #[test]
    fn markup_only_is_empty() {
        assert_eq!(clean_for_speech("**  **", 100), "");
        assert_eq!(clean_for_speech("   ", 100), "");
    }
}
