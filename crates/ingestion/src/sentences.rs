//! Sentence boundary detection
//!
//! Uses Unicode sentence boundaries (UAX #29) and then re-joins fragments
//! that end in a common academic abbreviation, since the Unicode rules break
//! after "e.g." or "et al." whenever the next word is capitalized.

use unicode_segmentation::UnicodeSegmentation;

const ABBREVIATIONS: &[&str] = &[
    "al.", "e.g.", "i.e.", "cf.", "vs.", "etc.", "fig.", "figs.", "eq.", "eqs.", "ref.", "refs.",
    "sec.", "ch.", "no.", "vol.", "pp.", "approx.", "dr.", "prof.", "mr.", "mrs.", "ms.", "st.",
];

/// Split `text` into trimmed, non-empty sentences in document order
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences: Vec<String> = Vec::new();
    let mut pending_join = false;

    for raw in text.unicode_sentences() {
        let sentence = raw.trim();
        if sentence.is_empty() {
            continue;
        }

        match sentences.last_mut() {
            Some(previous) if pending_join => {
                previous.push(' ');
                previous.push_str(sentence);
            }
            _ => sentences.push(sentence.to_string()),
        }

        pending_join = sentences.last().is_some_and(|s| ends_with_abbreviation(s));
    }

    sentences
}

/// Whitespace-delimited token count
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn ends_with_abbreviation(sentence: &str) -> bool {
    sentence
        .split_whitespace()
        .last()
        .map(|w| {
            let w = w.trim_start_matches(|c: char| c == '(' || c == '[').to_lowercase();
            ABBREVIATIONS.contains(&w.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_split() {
        let sentences = split_sentences("First sentence. Second one! Is this the third?");
        assert_eq!(
            sentences,
            vec!["First sentence.", "Second one!", "Is this the third?"]
        );
    }

    #[test]
    fn test_empty_text() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   \n\t ").is_empty());
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        let sentences = split_sentences(
            "Many fruits, e.g. Apples and pears, are sweet. Results by Smith et al. Were replicated. Bananas too.",
        );
        assert_eq!(
            sentences,
            vec![
                "Many fruits, e.g. Apples and pears, are sweet.",
                "Results by Smith et al. Were replicated.",
                "Bananas too."
            ]
        );
    }

    #[test]
    fn test_words_preserved_in_order() {
        let text = "Deep networks learn features.\n\nThey generalize (sometimes). Training needs data; lots of it.";
        let sentences = split_sentences(text);
        let rejoined: Vec<&str> = sentences.iter().flat_map(|s| s.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn test_token_count() {
        assert_eq!(token_count("one two  three\nfour"), 4);
        assert_eq!(token_count(""), 0);
    }
}
