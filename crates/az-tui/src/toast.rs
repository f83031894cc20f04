//! Transient notification toasts.
//!
//! The model keeps at most `max` toasts; pushing beyond that drops the
//! oldest. Ids come from a monotonic counter so expiration timers can name
//! the toast they belong to even after the list has churned.

use az_coord::ToastLevel;
use chrono::{DateTime, Duration, Utc};

/// One visible toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub level: ToastLevel,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

/// Bounded toast list with monotonic ids.
#[derive(Debug, Clone)]
pub struct Toasts {
    items: Vec<Toast>,
    next_id: u64,
    max: usize,
}

impl Default for Toasts {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
            max: 3,
        }
    }
}

impl Toasts {
    pub fn with_max(max: usize) -> Self {
        Self {
            max,
            ..Default::default()
        }
    }

    /// Push a toast; returns its id and expiry duration for the timer
    /// effect. The oldest toast is dropped when the list is full.
    pub fn push(
        &mut self,
        level: ToastLevel,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> (u64, std::time::Duration) {
        let id = self.next_id;
        self.next_id += 1;
        let secs = level.duration_secs();
        self.items.push(Toast {
            id,
            level,
            message: message.into(),
            expires_at: now + Duration::seconds(secs as i64),
        });
        if self.items.len() > self.max {
            self.items.remove(0);
        }
        (id, std::time::Duration::from_secs(secs))
    }

    /// Remove a toast by id (expiration dispatch). Unknown ids are ignored.
    pub fn expire(&mut self, id: u64) {
        self.items.retain(|t| t.id != id);
    }

    /// Drop anything past its deadline.
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        self.items.retain(|t| t.expires_at > now);
    }

    pub fn items(&self) -> &[Toast] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
