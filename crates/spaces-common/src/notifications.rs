use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Severity of a toast shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Warning,
    Error,
}

/// A dismissible, non-fatal message surfaced by the session engine.
#[derive(Debug, Clone)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl Toast {
    /// Creates an info toast with a 4-second TTL.
    pub fn info(message: impl Into<String>) -> Self {
        Self::with_ttl(ToastLevel::Info, message, Duration::from_secs(4))
    }

    /// Creates a warning toast with a 6-second TTL.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_ttl(ToastLevel::Warning, message, Duration::from_secs(6))
    }

    /// Creates an error toast with an 8-second TTL.
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_ttl(ToastLevel::Error, message, Duration::from_secs(8))
    }

    fn with_ttl(level: ToastLevel, message: impl Into<String>, ttl: Duration) -> Self {
        Self {
            level,
            message: message.into(),
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Returns `true` if this toast has exceeded its TTL.
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// A bounded queue of toasts that auto-evicts expired entries.
#[derive(Debug)]
pub struct ToastQueue {
    items: VecDeque<Toast>,
    capacity: usize,
}

impl ToastQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes a toast, evicting expired entries first.
    /// If still at capacity after eviction, the oldest entry is removed.
    pub fn push(&mut self, toast: Toast) {
        self.evict_expired();
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(toast);
    }

    /// Returns all currently visible (non-expired) toasts.
    pub fn visible(&mut self) -> Vec<&Toast> {
        self.evict_expired();
        self.items.iter().collect()
    }

    /// Removes the oldest toast (user dismissed it).
    pub fn dismiss(&mut self) -> Option<Toast> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn evict_expired(&mut self) {
        self.items.retain(|t| !t.is_expired());
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_and_ttls() {
        assert_eq!(Toast::info("a").level, ToastLevel::Info);
        assert_eq!(Toast::warning("b").ttl, Duration::from_secs(6));
        assert_eq!(Toast::error("c").level, ToastLevel::Error);
    }

    #[test]
    fn queue_drops_oldest_at_capacity() {
        let mut q = ToastQueue::new(2);
        q.push(Toast::info("first"));
        q.push(Toast::info("second"));
        q.push(Toast::info("third"));
        let visible: Vec<&str> = q.visible().iter().map(|t| t.message.as_str()).collect();
        assert_eq!(visible, vec!["second", "third"]);
    }

    #[test]
    fn expired_toasts_are_evicted() {
        let mut q = ToastQueue::new(4);
        let mut stale = Toast::info("stale");
        stale.ttl = Duration::ZERO;
        q.push(stale);
        q.push(Toast::error("fresh"));
        let visible = q.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].message, "fresh");
    }

    #[test]
    fn dismiss_pops_front() {
        let mut q = ToastQueue::default();
        q.push(Toast::warning("one"));
        q.push(Toast::warning("two"));
        assert_eq!(q.dismiss().map(|t| t.message), Some("one".to_string()));
        assert_eq!(q.len(), 1);
        assert!(!q.is_empty());
    }
}
