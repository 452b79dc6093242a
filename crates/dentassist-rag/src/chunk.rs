// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sentence-group chunking for knowledge ingestion.
//!
//! Seed passages are short clinical paragraphs; chunking keeps each indexed
//! unit small enough to embed well while preserving sentence boundaries.

/// Target sentences per chunk.
const SENTENCES_PER_CHUNK: usize = 3;

/// Soft character budget per chunk; a chunk closes early once exceeded.
const CHUNK_CHAR_BUDGET: usize = 480;

/// Splits `text` into sentence groups.
///
/// Sentences end at `.`, `!`, `?` or a newline. Groups close after
/// [`SENTENCES_PER_CHUNK`] sentences or once the character budget is
/// exceeded. Whitespace-only input yields no chunks.
pub fn sentence_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut sentences_in_current = 0;

    for sentence in split_sentences(text) {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
        sentences_in_current += 1;

        if sentences_in_current >= SENTENCES_PER_CHUNK || current.len() >= CHUNK_CHAR_BUDGET {
            chunks.push(std::mem::take(&mut current));
            sentences_in_current = 0;
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_three_sentences() {
        let text = "Un. Deux. Trois. Quatre. Cinq.";
        let chunks = sentence_chunks(text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "Un. Deux. Trois.");
        assert_eq!(chunks[1], "Quatre. Cinq.");
    }

    #[test]
    fn long_sentences_close_on_budget() {
        let long = format!("{}. {}. ", "a".repeat(400), "b".repeat(400));
        let chunks = sentence_chunks(&long);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(sentence_chunks("").is_empty());
        assert!(sentence_chunks("   \n  ").is_empty());
    }

    #[test]
    fn single_short_passage_is_one_chunk() {
        let chunks = sentence_chunks("Amoxicilline 2g/j pendant 7 jours.");
        assert_eq!(chunks.len(), 1);
    }
}
