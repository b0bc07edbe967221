use crate::error::PubtatorError;
use crate::pubtator::{Annotation, Document, SpanAnnotation};

/// Rarely followed by a sentence break.
const NO_SPLIT_AFTER: [&str; 18] = [
    "a.k.a.", "approx.", "ca.", "cf.", "e.g.", "et al.", "f.c.", "i.e.", "lit.", "vol.", "vs.",
    "dr.", "mr.", "mrs.", "ms.", "prof.", "resp.", "sp.",
];

/// Rarely followed by a sentence break when the next character is a digit.
const NO_SPLIT_BEFORE_NUMBER: [&str; 3] = ["fig.", "ib.", "no."];

const CLOSING: [char; 8] = [')', ']', '"', '\'', '\u{201d}', '\u{2019}', '.', '!'];

fn starts_sentence(ch: char) -> bool {
    ch.is_uppercase()
        || ch.is_ascii_digit()
        || matches!(ch, '(' | '[' | '"' | '\'' | '\u{201c}' | '\u{2018}')
}

fn ends_with_word(preceding: &str, word: &str) -> bool {
    preceding.strip_suffix(word).is_some_and(|rest| {
        rest.chars()
            .next_back()
            .is_none_or(|ch| !ch.is_alphanumeric())
    })
}

/// Whether the `.` at `chars[index]` closes an abbreviation rather than a sentence.
fn is_abbreviation(chars: &[(usize, char)], index: usize, next: char) -> bool {
    if chars[index].1 != '.' {
        return false;
    }
    let from = index.saturating_sub(8);
    let preceding = chars[from..=index]
        .iter()
        .map(|(_, ch)| ch.to_lowercase().to_string())
        .collect::<String>();
    if NO_SPLIT_AFTER
        .iter()
        .any(|word| ends_with_word(&preceding, word))
    {
        return true;
    }
    if next.is_ascii_digit()
        && NO_SPLIT_BEFORE_NUMBER
            .iter()
            .any(|word| ends_with_word(&preceding, word))
    {
        return true;
    }
    // Initials such as "J. Smith".
    index >= 1
        && chars[index - 1].1.is_uppercase()
        && (index == 1 || !chars[index - 2].1.is_alphanumeric())
}

/// Split `text` into sentences.
///
/// The returned pieces concatenate to `text`: whitespace between sentences
/// stays with the preceding piece.
pub fn sentence_split(text: &str) -> Vec<&str> {
    let chars = text.char_indices().collect::<Vec<_>>();
    let mut boundaries = Vec::new();
    let mut has_content = false;
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i].1;
        if ch == '\n' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if has_content && j < chars.len() {
                boundaries.push(chars[j].0);
                has_content = false;
            }
            i = j;
            continue;
        }
        if !ch.is_whitespace() {
            has_content = true;
        }
        if matches!(ch, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && CLOSING.contains(&chars[j].1) {
                j += 1;
            }
            let space_start = j;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if j > space_start
                && j < chars.len()
                && starts_sentence(chars[j].1)
                && !is_abbreviation(&chars, space_start - 1, chars[j].1)
            {
                boundaries.push(chars[j].0);
                has_content = false;
                i = j;
                continue;
            }
        }
        i += 1;
    }

    let mut pieces = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;
    for boundary in boundaries {
        pieces.push(&text[start..boundary]);
        start = boundary;
    }
    pieces.push(&text[start..]);
    pieces
}

fn add_sentences(document: &mut Document, text: &str, base_offset: usize) {
    if text.trim().is_empty() {
        return;
    }
    let mut offset = 0;
    for piece in sentence_split(text) {
        let sentence = piece.trim_end();
        let start = base_offset + offset;
        let end = start + sentence.chars().count();
        document.annotations.push(Annotation::Span(SpanAnnotation::new(
            document.id.clone(),
            start,
            end,
            sentence,
            "sentence",
        )));
        offset += piece.chars().count();
    }
}

/// Add a `title` span and `sentence` spans covering the document text.
pub fn segment(document: &mut Document) -> Result<(), PubtatorError> {
    let title = document.title();
    let text = document.text();
    if !text.starts_with(&title) {
        return Err(PubtatorError::TitleMismatch(document.id.clone()));
    }
    let title_chars = title.chars().count();
    if !title.trim().is_empty() {
        document.annotations.push(Annotation::Span(SpanAnnotation::new(
            document.id.clone(),
            0,
            title_chars,
            title.clone(),
            "title",
        )));
    }
    let (body, body_offset) = if title.is_empty() {
        (text.as_str(), 0)
    } else {
        // +1 for the separating newline
        (text.get(title.len() + 1..).unwrap_or(""), title_chars + 1)
    };
    add_sentences(document, &title, 0);
    add_sentences(document, body, body_offset);
    Ok(())
}
