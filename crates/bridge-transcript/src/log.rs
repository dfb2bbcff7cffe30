//! Append-only conversation log.

/// The session's running transcript, one `\n<label>: <text>` line per turn.
///
/// Only grows, except for [`ConversationLog::clear`] on an explicit wipe.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationLog {
    text: String,
}

impl ConversationLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line.
    pub fn append(&mut self, label: &str, text: &str) {
        self.text.push('\n');
        self.text.push_str(label);
        self.text.push_str(": ");
        self.text.push_str(text);
    }

    /// Full log text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Whether nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The last `max_chars` characters.
    pub fn tail(&self, max_chars: usize) -> &str {
        tail_chars(&self.text, max_chars)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.text.clear();
    }
}

/// The last `max_chars` characters of `s`, never splitting a scalar value.
pub fn tail_chars(s: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match s.char_indices().rev().nth(max_chars - 1) {
        Some((start, _)) => &s[start..],
        None => s,
    }
}
