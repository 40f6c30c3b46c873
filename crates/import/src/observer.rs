use std::sync::Mutex;

use crate::rules::MatchEvaluationError;

/// Sink for the diagnostics the import engine produces while it runs.
///
/// Components receive an observer instead of logging globally, so callers can
/// route skipped documents and fallback resolutions wherever they need them.
pub trait Observer: Send + Sync {
    /// A statement document or archive member was not recognised and skipped.
    fn document_skipped(&self, name: &str, reason: &str);

    /// A statement entry could not be normalized and was left out of the batch.
    fn entry_skipped(&self, reason: &str);

    /// No rule matched; the payee fell back to a raw candidate.
    fn payee_fallback(&self, sources: &[String], payee: &str);

    /// A rule could not be evaluated. Reported once per rule per store.
    fn rule_failed(&self, error: &MatchEvaluationError);
}

// ── tracing backend (default) ─────────────────────────────────────────────────

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn document_skipped(&self, name: &str, reason: &str) {
        tracing::debug!(document = name, reason, "skipping document");
    }

    fn entry_skipped(&self, reason: &str) {
        tracing::warn!(reason, "skipping statement entry");
    }

    fn payee_fallback(&self, sources: &[String], payee: &str) {
        tracing::debug!(?sources, payee, "no payee rule matched");
    }

    fn rule_failed(&self, error: &MatchEvaluationError) {
        tracing::warn!("{error}");
    }
}

// ── Recording backend (used for tests and dry runs) ───────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    DocumentSkipped { name: String, reason: String },
    EntrySkipped { reason: String },
    PayeeFallback { payee: String },
    RuleFailed { label: String },
}

/// Keeps every event in memory, in the order reported.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.lock().clone()
    }

    fn push(&self, event: ObservedEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ObservedEvent>> {
        // A poisoned log is still a valid log.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Observer for RecordingObserver {
    fn document_skipped(&self, name: &str, reason: &str) {
        self.push(ObservedEvent::DocumentSkipped {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }

    fn entry_skipped(&self, reason: &str) {
        self.push(ObservedEvent::EntrySkipped { reason: reason.to_string() });
    }

    fn payee_fallback(&self, _sources: &[String], payee: &str) {
        self.push(ObservedEvent::PayeeFallback { payee: payee.to_string() });
    }

    fn rule_failed(&self, error: &MatchEvaluationError) {
        self.push(ObservedEvent::RuleFailed { label: error.label.clone() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_order() {
        let rec = RecordingObserver::new();
        rec.document_skipped("a.xml", "not a statement");
        rec.payee_fallback(&["x".to_string()], "x");
        assert_eq!(
            rec.events(),
            vec![
                ObservedEvent::DocumentSkipped {
                    name: "a.xml".to_string(),
                    reason: "not a statement".to_string()
                },
                ObservedEvent::PayeeFallback { payee: "x".to_string() },
            ]
        );
    }
}
