//! Output-based activity detection for assistant sessions.
//!
//! A monitor samples `capture_pane` on an interval and classifies the tail
//! of the output with an ordered rule set; the first matching rule wins.
//! State transitions are reported through a channel so the coordinator can
//! publish them to the UI.

use std::sync::Arc;
use std::time::Duration;

use az_core::types::{BeadId, SessionState};
use az_mux::Multiplexer;
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default sampling interval.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// How many trailing lines of the capture participate in classification.
const TAIL_LINES: usize = 30;

/// Ordered first-match-wins classifier over captured pane output.
#[derive(Debug, Clone)]
pub struct ActivityClassifier {
    rules: Arc<Vec<(Regex, SessionState)>>,
}

impl Default for ActivityClassifier {
    fn default() -> Self {
        // Order matters: failure and completion markers outrank prompts,
        // prompts outrank the busy spinner.
        let rules = vec![
            (r"(?i)error:|fatal:|panicked at|command failed", SessionState::Error),
            (r"(?i)task complete|all done|✓ done|session ended", SessionState::Done),
            (r"(?im)^\s*(│\s*)?>\s*$", SessionState::Waiting),
            (r"(?i)waiting for (your )?input|\? for shortcuts|yes, and don't ask again", SessionState::Waiting),
            (r"(?i)esc to interrupt|thinking|working|running", SessionState::Busy),
        ];
        Self::from_rules(rules)
    }
}

impl ActivityClassifier {
    /// Build a classifier from `(pattern, state)` pairs. Invalid patterns
    /// are skipped with a warning rather than failing session startup.
    pub fn from_rules(rules: Vec<(&str, SessionState)>) -> Self {
        let compiled = rules
            .into_iter()
            .filter_map(|(pattern, state)| match Regex::new(pattern) {
                Ok(re) => Some((re, state)),
                Err(e) => {
                    warn!(pattern, error = %e, "skipping invalid activity rule");
                    None
                }
            })
            .collect();
        Self {
            rules: Arc::new(compiled),
        }
    }

    /// Classify a pane capture. `None` means no rule matched and the
    /// previous state should be kept.
    pub fn classify(&self, capture: &str) -> Option<SessionState> {
        let lines: Vec<&str> = capture.lines().collect();
        let start = lines.len().saturating_sub(TAIL_LINES);
        let tail = lines[start..].join("\n");
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(&tail))
            .map(|(_, state)| *state)
    }
}

/// Handle to a running per-session monitor; aborts the task on drop.
pub struct ActivityMonitor {
    handle: JoinHandle<()>,
}

impl ActivityMonitor {
    /// Spawn a monitor sampling `session` until stopped. Transitions are
    /// sent as `(bead, state)`; the receiver decides what to publish.
    pub fn spawn(
        mux: Arc<dyn Multiplexer>,
        bead: BeadId,
        session: String,
        classifier: ActivityClassifier,
        interval: Duration,
        events: mpsc::UnboundedSender<(BeadId, SessionState)>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut last = SessionState::Busy;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let capture = match mux.capture_pane(&session).await {
                    Ok(text) => text,
                    Err(e) => {
                        // Session gone: report Done once and stop sampling
                        debug!(session, error = %e, "capture failed, monitor exiting");
                        let _ = events.send((bead.clone(), SessionState::Done));
                        return;
                    }
                };
                if let Some(state) = classifier.classify(&capture) {
                    if state != last {
                        debug!(session, from = %last, to = %state, "activity transition");
                        last = state;
                        if events.send((bead.clone(), state)).is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Self { handle }
    }

    /// Stop sampling.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_outranks_busy() {
        let c = ActivityClassifier::default();
        let capture = "running tests\nerror: assertion failed\nesc to interrupt";
        assert_eq!(c.classify(capture), Some(SessionState::Error));
    }

    #[test]
    fn test_prompt_detected_as_waiting() {
        let c = ActivityClassifier::default();
        assert_eq!(c.classify("some output\n> \n"), Some(SessionState::Waiting));
        assert_eq!(
            c.classify("Do you want to proceed? yes, and don't ask again"),
            Some(SessionState::Waiting)
        );
    }

    #[test]
    fn test_done_marker() {
        let c = ActivityClassifier::default();
        assert_eq!(c.classify("...\nTask complete.\n"), Some(SessionState::Done));
    }

    #[test]
    fn test_busy_spinner() {
        let c = ActivityClassifier::default();
        assert_eq!(
            c.classify("Thinking...\n(esc to interrupt)"),
            Some(SessionState::Busy)
        );
    }

    #[test]
    fn test_no_match_keeps_previous() {
        let c = ActivityClassifier::default();
        assert_eq!(c.classify("plain unremarkable output"), None);
    }

    #[test]
    fn test_first_match_wins_order() {
        let c = ActivityClassifier::from_rules(vec![
            ("alpha", SessionState::Done),
            ("alpha beta", SessionState::Error),
        ]);
        // Both patterns match; the earlier rule decides
        assert_eq!(c.classify("alpha beta"), Some(SessionState::Done));
    }

    #[test]
    fn test_only_tail_is_classified() {
        let c = ActivityClassifier::default();
        let mut capture = String::from("error: old failure way up in scrollback\n");
        capture.push_str(&"unremarkable\n".repeat(60));
        assert_eq!(c.classify(&capture), None);
    }

    #[test]
    fn test_invalid_rule_is_skipped() {
        let c = ActivityClassifier::from_rules(vec![
            ("(unclosed", SessionState::Error),
            ("fine", SessionState::Done),
        ]);
        assert_eq!(c.classify("fine"), Some(SessionState::Done));
    }
}
