//! Phrase patterns the assistant uses to confirm memory operations.
//!
//! The assistant persona is instructed to say these phrases verbatim, so
//! matching is exact apart from case and surrounding whitespace. Russian is
//! the primary language; English equivalents are accepted too.

use std::sync::LazyLock;

use regex::Regex;

/// `**bold**` annotation spans.
static BOLD_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*.*?\*\*").unwrap());

/// `[bracketed]` annotation spans.
static BRACKET_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[.*?\]").unwrap());

/// "Your name is recorded: X".
pub static NAME_CONFIRMATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:тво[её] имя записано|your name is recorded):\s*([А-Яа-яЁёA-Za-z]+)")
        .unwrap()
});

/// Looser self-introductions, only used for the end-of-session scan.
static NAME_DECLARATIONS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)\b(?:называй меня|call me)\s+([А-Яа-яЁёA-Za-z]+)").unwrap(),
        Regex::new(r"(?i)\b(?:мо[её] имя|my name is)\s+([А-Яа-яЁёA-Za-z]+)").unwrap(),
    ]
});

/// "Correction noted: <rule>" up to the end of the line.
pub static RULE_CONFIRMATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:запомнил поправку|correction noted):\s*(.+)").unwrap()
});

/// "Forget everything".
pub static WIPE_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)забудь вс[её]|сброс памяти|очисти память|forget everything|wipe memory")
        .unwrap()
});

/// Words the loose patterns capture that are never names.
const NAME_STOPLIST: &[&str] = &[
    "голосом", "напарник", "джун", "тебя", "меня", "привет", "сейчас", "тут", "мой", "твой",
    "you", "me", "partner", "here", "now", "hello",
];

/// Remove bold and bracketed annotation spans, then trim.
pub fn strip_annotations(text: &str) -> String {
    let text = BOLD_SPAN.replace_all(text, "");
    let text = BRACKET_SPAN.replace_all(&text, "");
    text.trim().to_owned()
}

/// Latest confirmed name in `text`.
pub fn confirmed_name(text: &str) -> Option<&str> {
    NAME_CONFIRMATION
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .last()
        .map(|m| m.as_str())
}

/// Every confirmed rule in `text`, trimmed, oldest first.
pub fn confirmed_rules(text: &str) -> impl Iterator<Item = &str> {
    RULE_CONFIRMATION
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|rule| !rule.is_empty())
}

/// Whether `text` asks to forget everything.
pub fn is_wipe_command(text: &str) -> bool {
    WIPE_COMMAND.is_match(text)
}

/// Best name found anywhere in a full session log.
///
/// Patterns are tried in priority order (explicit confirmation first); within
/// one pattern the latest occurrence wins. The first pattern with any match
/// decides: its candidate is returned if it passes the stoplist and
/// `min_chars`, otherwise no name is reported.
pub fn scan_for_name(log: &str, min_chars: usize) -> Option<String> {
    let patterns = std::iter::once(&*NAME_CONFIRMATION).chain(NAME_DECLARATIONS.iter());
    for pattern in patterns {
        let Some(candidate) = pattern
            .captures_iter(log)
            .filter_map(|c| c.get(1))
            .last()
            .map(|m| m.as_str())
        else {
            continue;
        };
        let lowered = candidate.to_lowercase();
        let plausible = candidate.chars().count() >= min_chars
            && !NAME_STOPLIST.contains(&lowered.as_str());
        return plausible.then(|| candidate.to_owned());
    }
    None
}
