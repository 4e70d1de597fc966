use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use teller_core::{parse_amount, EntityMention, CURRENCY_WORDS};
use unicode_segmentation::UnicodeSegmentation;

use crate::EntityExtractor;

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid date regex"));

const CURRENCY_SYMBOLS: &[&str] = &["$", "€", "£"];
const SENTENCE_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';'];
const TRANSFER_VERBS: &[&str] = &["send", "transfer", "pay", "wire"];
const RECIPIENT_CUES: &[&str] = &["to", "pay", "send", "for"];
const NOT_NAMES: &[&str] = &[
    "I", "Me", "My", "Mine", "The", "A", "An", "Account", "Savings", "Checking", "Today",
    "Tomorrow", "Yesterday", "Please",
];

/// Span-level extractor for names, amounts and dates. Handles the phrasings a
/// banking chat produces ("send $100 to John", "pay Sarah 40 euros"); anything
/// subtler belongs to a trained NER model behind the same trait.
#[derive(Debug, Clone, Default)]
pub struct RuleEntityExtractor;

impl RuleEntityExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl EntityExtractor for RuleEntityExtractor {
    fn model_name(&self) -> &'static str {
        "rule-entities"
    }

    fn extract(&self, text: &str) -> Result<Vec<EntityMention>> {
        Ok(extract_entities(text, Utc::now().date_naive()))
    }
}

fn extract_entities(text: &str, today: NaiveDate) -> Vec<EntityMention> {
    let words = text
        .split_word_bound_indices()
        .filter(|(_, segment)| !segment.trim().is_empty())
        .collect::<Vec<_>>();

    let mut found: Vec<(usize, EntityMention)> = Vec::new();
    let mut date_spans = Vec::new();
    for captures in ISO_DATE.captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let parsed = NaiveDate::parse_from_str(whole.as_str(), "%Y-%m-%d").ok();
        found.push((whole.start(), EntityMention::date(whole.as_str(), parsed)));
        date_spans.push(whole.range());
    }

    let is_command = words
        .first()
        .is_some_and(|(_, first)| TRANSFER_VERBS.contains(&first.to_lowercase().as_str()));
    let mut idx = 0;

    while idx < words.len() {
        let (offset, word) = words[idx];

        if date_spans.iter().any(|span| span.contains(&offset)) {
            idx += 1;
            continue;
        }

        if starts_with_digit(word) {
            if let Some((start, mention, consumed)) = amount_at(text, &words, idx, is_command) {
                found.push((start, mention));
                idx += consumed;
                continue;
            }
        }

        if is_recipient_cue(word) {
            let name_parts = words[idx + 1..]
                .iter()
                .take_while(|(_, candidate)| is_name_word(candidate))
                .map(|(_, candidate)| *candidate)
                .collect::<Vec<_>>();
            if !name_parts.is_empty() {
                let start = words[idx + 1].0;
                found.push((start, EntityMention::person(name_parts.join(" "))));
                idx += 1 + name_parts.len();
                continue;
            }
        }

        if let Some(date) = relative_date(word, today) {
            found.push((offset, EntityMention::date(word, Some(date))));
        }

        idx += 1;
    }

    found.sort_by_key(|(offset, _)| *offset);
    found.into_iter().map(|(_, mention)| mention).collect()
}

/// Returns (start offset, mention, segments consumed) for an amount anchored at
/// the numeric segment `idx`. The whole whitespace-delimited span is kept as
/// the raw value, so `10:30` or `$-50` surface as one mention with no usable
/// value instead of a fragment that parses. Bare numbers only count inside a
/// transfer command.
fn amount_at(
    text: &str,
    words: &[(usize, &str)],
    idx: usize,
    is_command: bool,
) -> Option<(usize, EntityMention, usize)> {
    let (offset, _) = words[idx];
    let span = token_span(text, offset);
    let raw = &text[span.clone()];
    let in_span = words[idx..]
        .iter()
        .take_while(|(start, _)| *start < span.end)
        .count();
    let previous = idx.checked_sub(1).map(|prev| words[prev]);
    let next = words.get(idx + in_span).copied();

    if raw.starts_with(|ch: char| teller_core::CURRENCY_SYMBOLS.contains(&ch)) {
        return Some((span.start, EntityMention::amount(raw, parse_amount(raw)), in_span));
    }

    if let Some((symbol_offset, symbol)) = previous {
        if CURRENCY_SYMBOLS.contains(&symbol) && symbol_offset < span.start {
            let raw = &text[symbol_offset..span.end];
            return Some((symbol_offset, EntityMention::amount(raw, parse_amount(raw)), in_span));
        }
    }

    if let Some((unit_offset, unit)) = next {
        if CURRENCY_WORDS.contains(&unit.to_lowercase().as_str()) {
            let raw = &text[span.start..unit_offset + unit.len()];
            return Some((span.start, EntityMention::amount(raw, parse_amount(raw)), in_span + 1));
        }
    }

    let after_verb = previous
        .is_some_and(|(_, verb)| TRANSFER_VERBS.contains(&verb.to_lowercase().as_str()));
    if is_command || after_verb {
        return Some((span.start, EntityMention::amount(raw, parse_amount(raw)), in_span));
    }

    None
}

/// Byte range of the whitespace-delimited token around `offset`, without
/// trailing sentence punctuation.
fn token_span(text: &str, offset: usize) -> std::ops::Range<usize> {
    let start = text[..offset]
        .rfind(char::is_whitespace)
        .map_or(0, |pos| pos + text[pos..].chars().next().map_or(1, char::len_utf8));
    let end = text[offset..]
        .find(char::is_whitespace)
        .map_or(text.len(), |pos| offset + pos);
    let trimmed = text[start..end].trim_end_matches(SENTENCE_PUNCTUATION);
    start..start + trimmed.len().max(offset - start + 1)
}

fn relative_date(word: &str, today: NaiveDate) -> Option<NaiveDate> {
    match word.to_lowercase().as_str() {
        "today" => Some(today),
        "tomorrow" => today.checked_add_signed(Duration::days(1)),
        "yesterday" => today.checked_sub_signed(Duration::days(1)),
        _ => None,
    }
}

fn starts_with_digit(word: &str) -> bool {
    word.chars().next().is_some_and(|ch| ch.is_ascii_digit())
}

fn is_recipient_cue(word: &str) -> bool {
    RECIPIENT_CUES.contains(&word.to_lowercase().as_str())
}

fn is_name_word(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_uppercase()
        && chars.all(|ch| ch.is_alphabetic() || ch == '\'' || ch == '-')
        && !NOT_NAMES.contains(&word)
}
