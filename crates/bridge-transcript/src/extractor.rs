//! Per-session transcript state and memory heuristics.

use std::collections::HashSet;
use std::time::Instant;

use bridge_settings::TranscriptSettings;
use tracing::{debug, info};

use crate::log::ConversationLog;
use crate::mutation::MemoryMutation;
use crate::patterns;

/// Conversation log plus the bookkeeping that keeps memory writes minimal.
///
/// Owned by one session; not shared.
#[derive(Debug)]
pub struct TranscriptExtractor {
    settings: TranscriptSettings,
    log: ConversationLog,
    known_name: Option<String>,
    saved_rules: HashSet<String>,
    last_autosave: Option<Instant>,
}

impl TranscriptExtractor {
    /// Fresh extractor with an empty log.
    pub fn new(settings: TranscriptSettings) -> Self {
        Self {
            settings,
            log: ConversationLog::new(),
            known_name: None,
            saved_rules: HashSet::new(),
            last_autosave: None,
        }
    }

    /// Seed the name already stored, so confirming it again writes nothing.
    pub fn set_known_name(&mut self, name: Option<String>) {
        self.known_name = name;
    }

    /// The session log.
    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Log text the user typed or said. Synthesized triggers must be filtered
    /// out by the caller.
    pub fn record_user_text(&mut self, text: &str) {
        self.log.append(&self.settings.user_label, text);
    }

    /// Log one piece of assistant text and derive memory updates from it.
    ///
    /// Returned mutations must be applied in order.
    pub fn observe_assistant_text(&mut self, raw: &str, now: Instant) -> Vec<MemoryMutation> {
        let text = patterns::strip_annotations(raw);
        if text.is_empty() {
            return Vec::new();
        }
        self.log.append(&self.settings.assistant_label, &text);

        if patterns::is_wipe_command(&text) {
            info!("wipe command received, clearing memory");
            self.log.clear();
            self.known_name = None;
            self.saved_rules.clear();
            return vec![MemoryMutation::Wipe];
        }

        let mut mutations = Vec::new();
        let window = self.log.tail(self.settings.trailing_window_chars);

        if let Some(name) = patterns::confirmed_name(window) {
            if self.known_name.as_deref() != Some(name) {
                info!(user_name = name, "name confirmed");
                self.known_name = Some(name.to_owned());
                mutations.push(MemoryMutation::SetName(name.to_owned()));
            }
        }

        for rule in patterns::confirmed_rules(window) {
            if self.saved_rules.insert(rule.to_owned()) {
                info!(rule, "correction rule confirmed");
                mutations.push(MemoryMutation::AppendRule(rule.to_owned()));
            }
        }

        let due = self
            .last_autosave
            .is_none_or(|last| now.saturating_duration_since(last) > self.settings.autosave_interval());
        if due {
            debug!(log_chars = self.log.char_len(), "autosave");
            self.last_autosave = Some(now);
            mutations.push(MemoryMutation::Autosave {
                summary: self.log.tail(self.settings.autosave_summary_chars).to_owned(),
            });
        }

        mutations
    }

    /// The end-of-session merge, or `None` when the log is too short to keep.
    pub fn final_mutation(&self) -> Option<MemoryMutation> {
        if self.log.char_len() <= self.settings.min_log_chars {
            return None;
        }
        let user_name = patterns::scan_for_name(self.log.as_str(), self.settings.min_name_chars);
        Some(MemoryMutation::Final {
            summary: self.log.tail(self.settings.final_summary_chars).to_owned(),
            user_name,
        })
    }
}
