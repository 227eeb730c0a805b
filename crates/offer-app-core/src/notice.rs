// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bounded notice queue with TTL + dedupe for user-visible action results.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Notice severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Informational note.
    Info,
    /// Recoverable problem; the user may retry.
    Warn,
    /// Action failed.
    Error,
}

/// Identifier for a notice entry.
pub type NoticeId = u64;

/// A notice as stored in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    /// Stable identifier.
    pub id: NoticeId,
    /// Severity.
    pub kind: NoticeKind,
    /// Short title line.
    pub title: String,
    /// Optional body text.
    pub body: Option<String>,
    /// Time-to-live duration.
    pub ttl: Duration,
    /// Creation (or last dedupe refresh) time.
    pub created: Instant,
}

impl Notice {
    fn alive_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) < self.ttl
    }
}

/// In-memory notice queue. Oldest entries are evicted once `max` is reached.
#[derive(Debug)]
pub struct NoticeQueue {
    queue: VecDeque<Notice>,
    max: usize,
    dedupe_window: Duration,
    next_id: NoticeId,
}

impl NoticeQueue {
    /// Create a queue holding at most `max` notices.
    pub fn new(max: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max: max.max(1),
            dedupe_window: Duration::from_secs(2),
            next_id: 1,
        }
    }

    /// Push a notice. An identical notice (kind/title/body) pushed within the
    /// dedupe window refreshes the existing entry instead of adding a new one.
    pub fn push<S, B>(
        &mut self,
        kind: NoticeKind,
        title: S,
        body: B,
        ttl: Duration,
        now: Instant,
    ) -> NoticeId
    where
        S: Into<String>,
        B: Into<Option<String>>,
    {
        let title = title.into();
        let body = body.into();

        if let Some(existing) = self.queue.iter_mut().find(|n| {
            n.kind == kind
                && n.title == title
                && n.body == body
                && now.saturating_duration_since(n.created) <= self.dedupe_window
        }) {
            existing.created = now;
            existing.ttl = ttl;
            return existing.id;
        }

        let id = self.next_id;
        self.next_id += 1;
        if self.queue.len() == self.max {
            self.queue.pop_front();
        }
        self.queue.push_back(Notice {
            id,
            kind,
            title,
            body,
            ttl,
            created: now,
        });
        id
    }

    /// Drop expired notices.
    pub fn retain_visible(&mut self, now: Instant) {
        self.queue.retain(|n| n.alive_at(now));
    }

    /// Notices still within their TTL, oldest first.
    pub fn visible(&self, now: Instant) -> Vec<Notice> {
        self.queue
            .iter()
            .filter(|n| n.alive_at(now))
            .cloned()
            .collect()
    }

    /// Remove and return every queued notice, expired or not.
    pub fn drain(&mut self) -> Vec<Notice> {
        self.queue.drain(..).collect()
    }

    /// Number of queued notices.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(5);

    #[test]
    fn identical_notices_within_window_are_deduped() {
        let mut q = NoticeQueue::new(8);
        let t0 = Instant::now();
        let a = q.push(NoticeKind::Error, "save failed", None, TTL, t0);
        let b = q.push(
            NoticeKind::Error,
            "save failed",
            None,
            TTL,
            t0 + Duration::from_millis(100),
        );
        assert_eq!(a, b);
        assert_eq!(q.len(), 1);
        let c = q.push(
            NoticeKind::Error,
            "save failed",
            Some("other".to_string()),
            TTL,
            t0,
        );
        assert_ne!(a, c);
    }

    #[test]
    fn oldest_is_evicted_at_capacity() {
        let mut q = NoticeQueue::new(2);
        let t0 = Instant::now();
        q.push(NoticeKind::Info, "one", None, TTL, t0);
        q.push(NoticeKind::Info, "two", None, TTL, t0);
        q.push(NoticeKind::Info, "three", None, TTL, t0);
        let titles: Vec<_> = q.visible(t0).into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["two", "three"]);
    }

    #[test]
    fn expired_notices_are_hidden_and_retained_out() {
        let mut q = NoticeQueue::new(4);
        let t0 = Instant::now();
        q.push(NoticeKind::Warn, "retry", None, Duration::from_secs(1), t0);
        let later = t0 + Duration::from_secs(2);
        assert!(q.visible(later).is_empty());
        assert_eq!(q.len(), 1);
        q.retain_visible(later);
        assert!(q.is_empty());
    }

    #[test]
    fn drain_empties_queue() {
        let mut q = NoticeQueue::new(4);
        let t0 = Instant::now();
        q.push(NoticeKind::Info, "a", None, TTL, t0);
        q.push(NoticeKind::Warn, "b", None, TTL, t0);
        assert_eq!(q.drain().len(), 2);
        assert!(q.is_empty());
    }
}
