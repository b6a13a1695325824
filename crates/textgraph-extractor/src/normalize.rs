//! Text normalization
//!
//! Produces the canonical text every extractor reads: whitespace collapsed,
//! typographic quotes and dashes folded to ASCII, characters outside the
//! whitelist removed, ends trimmed.

/// Punctuation kept by [`normalize`]; letters and digits are always kept.
const PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '\'', '"', '-', '(', ')', '&', '/', '%', '$', '@', '#', '+',
];

/// Words ending in a period that do not end a sentence
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "st", "jr", "sr", "inc", "corp", "ltd", "co", "vs", "etc",
    "e.g", "i.e",
];

/// Typographic quotes and dashes folded to their ASCII forms
fn fold_typography(ch: char) -> char {
    match ch {
        '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201F}' | '\u{2033}' => '"',
        '\u{2010}'..='\u{2014}' => '-',
        other => other,
    }
}

fn is_allowed(ch: char) -> bool {
    ch.is_alphanumeric() || PUNCTUATION.contains(&ch)
}

/// Normalize raw text.
///
/// Pure and infallible. An empty result means there is nothing to extract.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for ch in raw.chars().map(fold_typography) {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if !is_allowed(ch) {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }

    out
}

/// Split normalized text into sentences.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace or end of text,
/// unless the period closes a known abbreviation (`Dr.`, `Inc.`).
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if !at_boundary {
            continue;
        }
        if ch == '.' && ends_with_abbreviation(&text[start..idx]) {
            continue;
        }

        let end = idx + ch.len_utf8();
        push_trimmed(&mut sentences, &text[start..end]);
        start = end;
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn ends_with_abbreviation(prefix: &str) -> bool {
    prefix
        .split_whitespace()
        .next_back()
        .map(|word| ABBREVIATIONS.contains(&word.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn push_trimmed<'a>(sentences: &mut Vec<&'a str>, slice: &'a str) {
    let trimmed = slice.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(
            normalize("  Apple\tis\n\nfounded   by Steve Jobs.  "),
            "Apple is founded by Steve Jobs."
        );
    }

    #[test]
    fn test_strips_non_whitelisted_characters() {
        assert_eq!(normalize("Tesla™ <owns> *stuff*"), "Tesla owns stuff");
        assert_eq!(normalize("café & crème"), "café & crème");
    }

    #[test]
    fn test_folds_typographic_punctuation() {
        assert_eq!(
            normalize("Tesla\u{2019}s \u{201C}Model S\u{201D} \u{2014} fast"),
            "Tesla's \"Model S\" - fast"
        );
    }

    #[test]
    fn test_empty_output_for_symbols_only() {
        assert_eq!(normalize("   \n\t "), "");
        assert_eq!(normalize("*** ~~~ ^^^"), "");
    }

    #[test]
    fn test_split_sentences() {
        let text = "Apple is founded by Steve Jobs. Elon Musk owns Tesla.";
        assert_eq!(
            split_sentences(text),
            vec!["Apple is founded by Steve Jobs.", "Elon Musk owns Tesla."]
        );
    }

    #[test]
    fn test_split_keeps_abbreviations() {
        let text = "Dr. Jane Goodall studies chimpanzees! Acme Inc. is based in Paris";
        assert_eq!(
            split_sentences(text),
            vec![
                "Dr. Jane Goodall studies chimpanzees!",
                "Acme Inc. is based in Paris"
            ]
        );
    }

    #[test]
    fn test_split_ignores_inner_periods() {
        assert_eq!(split_sentences("Version 2.5 shipped."), vec!["Version 2.5 shipped."]);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(raw in "\\PC{0,200}") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn prop_normalized_has_no_runs_or_edges(raw in "[a-zA-Z \\t\\n.,*~]{0,200}") {
            let text = normalize(&raw);
            prop_assert!(!text.contains("  "));
            prop_assert!(!text.contains('\t'));
            prop_assert!(!text.contains('\n'));
            prop_assert_eq!(text.trim(), text.as_str());
        }
    }
}
