//! Topic hierarchy helpers.
//!
//! Topic structure: `{segment}.{segment}.{segment}`
//!
//! A topic is an ancestor of another when it can be formed by dropping one
//! or more trailing segments: `"a"` and `"a.b"` are ancestors of `"a.b.c"`.
//! Topics are never validated; empty segments split like any other.

use std::sync::atomic::{AtomicU64, Ordering};

/// Segment separator.
pub const SEPARATOR: char = '.';

/// Default namespace for generated reply topics.
pub const REPLY_NAMESPACE: &str = "$ret";

/// Iterator over a topic and its ancestors, most specific first.
///
/// `"a.b.c"` yields `"a.b.c"`, `"a.b"`, `"a"`.
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    next: Option<&'a str>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.rfind(SEPARATOR).map(|idx| &current[..idx]);
        Some(current)
    }
}

/// Walk `topic` up to its first segment, inclusive.
#[must_use]
pub fn ancestors(topic: &str) -> Ancestors<'_> {
    Ancestors { next: Some(topic) }
}

/// Generator of reply topics unique among outstanding calls.
///
/// Topics look like `{namespace}.{n}` with `n` taken from a monotonic counter.
#[derive(Debug)]
pub struct ReplyTopics {
    namespace: String,
    counter: AtomicU64,
}

impl Default for ReplyTopics {
    fn default() -> Self {
        Self::new(REPLY_NAMESPACE)
    }
}

impl ReplyTopics {
    /// Create a generator under the given namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Allocate the next reply topic.
    pub fn next_topic(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{SEPARATOR}{n}", self.namespace)
    }
}
