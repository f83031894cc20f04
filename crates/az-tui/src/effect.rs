//! Effects returned by the pure update function.
//!
//! An effect is a descriptive value; the runtime interprets it after the new
//! model is in place, in insertion order, without blocking the render loop.
//! Side effects are limited to: sending a coordinator request, polling the
//! subscription channel, scheduling a toast expiration, emitting a follow-up
//! message, and signalling exit.

use std::time::Duration;

use az_coord::Request;

use crate::msg::Msg;

/// A scheduled action that will (possibly) produce a `Msg`.
#[derive(Debug)]
pub enum Effect {
    /// Nothing to do
    None,
    /// Execute in order
    Batch(Vec<Effect>),
    /// Send a request to the coordinator
    Send(Request),
    /// Drain the coordinator subscription non-blockingly
    PollEvents,
    /// Deliver `Msg::ToastExpired(id)` after the delay
    ToastTimer { id: u64, after: Duration },
    /// Feed a follow-up message through update on the next cycle
    Emit(Box<Msg>),
    /// Clean exit
    Quit,
}

impl Effect {
    /// The no-op effect.
    pub fn none() -> Self {
        Self::None
    }

    /// Effect sending one coordinator request.
    pub fn from(request: Request) -> Self {
        Self::Send(request)
    }

    /// Combine effects, skipping no-ops.
    pub fn batch(effects: impl IntoIterator<Item = Effect>) -> Self {
        let mut flat: Vec<Effect> = effects
            .into_iter()
            .filter(|e| !matches!(e, Effect::None))
            .collect();
        match flat.len() {
            0 => Self::None,
            1 => flat.remove(0),
            _ => Self::Batch(flat),
        }
    }

    /// Map the messages an effect will emit. Requests and timers are
    /// unaffected; only `Emit` payloads are rewritten.
    pub fn map(self, f: &impl Fn(Msg) -> Msg) -> Self {
        match self {
            Self::Emit(msg) => Self::Emit(Box::new(f(*msg))),
            Self::Batch(effects) => {
                Self::Batch(effects.into_iter().map(|e| e.map(f)).collect())
            }
            other => other,
        }
    }

    /// True when the effect does nothing at all.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Collect all requests in this effect (tests and the runtime).
    pub fn requests(&self) -> Vec<&Request> {
        match self {
            Self::Send(request) => vec![request],
            Self::Batch(effects) => effects.iter().flat_map(Effect::requests).collect(),
            _ => Vec::new(),
        }
    }

    /// True when the effect (or any nested one) signals exit.
    pub fn quits(&self) -> bool {
        match self {
            Self::Quit => true,
            Self::Batch(effects) => effects.iter().any(Effect::quits),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_flattens_noops() {
        assert!(Effect::batch([Effect::None, Effect::None]).is_none());

        let single = Effect::batch([Effect::None, Effect::Quit]);
        assert!(matches!(single, Effect::Quit));

        let multi = Effect::batch([Effect::Quit, Effect::PollEvents]);
        assert!(matches!(multi, Effect::Batch(ref v) if v.len() == 2));
    }

    #[test]
    fn test_requests_collects_nested() {
        let effect = Effect::batch([
            Effect::from(Request::RefreshBeads),
            Effect::Batch(vec![Effect::from(Request::RequestQuit), Effect::PollEvents]),
        ]);
        assert_eq!(effect.requests().len(), 2);
    }

    #[test]
    fn test_map_rewrites_emitted_msgs() {
        let effect = Effect::Emit(Box::new(Msg::Tick));
        let mapped = effect.map(&|_| Msg::QuitRequested);
        match mapped {
            Effect::Emit(msg) => assert!(matches!(*msg, Msg::QuitRequested)),
            _ => panic!("expected Emit"),
        }
    }

    #[test]
    fn test_quits_detection() {
        assert!(Effect::Quit.quits());
        assert!(Effect::Batch(vec![Effect::None, Effect::Quit]).quits());
        assert!(!Effect::PollEvents.quits());
    }
}
