//! Recoverable per-record problems and their grouped summary.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::warn;

use crate::error::{IssueContext, RecordFailure};

/// A recoverable problem found while importing one raw line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub message: String,
    pub line_number: Option<u64>,
    pub date: Option<String>,
    pub boardings: Option<i64>,
    pub alightings: Option<i64>,
}

impl Issue {
    pub fn new(message: impl Into<String>) -> Self {
        Issue {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn at_line(mut self, line_number: u64) -> Self {
        self.line_number = Some(line_number);
        self
    }

    pub fn with_context(mut self, context: IssueContext) -> Self {
        self.date = context.date;
        self.boardings = context.boardings;
        self.alightings = context.alightings;
        self
    }

    /// Builds the Issue for a raw line an adapter could not resolve.
    pub fn from_failure(failure: RecordFailure, line_number: u64) -> Self {
        Issue::new(failure.error.to_string())
            .at_line(line_number)
            .with_context(failure.context)
    }
}

/// Append-only destination for Issues. The pipeline never reads it back.
pub trait IssueSink: Send + Sync {
    fn record_issue(&self, issue: Issue);
}

/// In-memory [`IssueSink`] that also logs each Issue at `warn`.
#[derive(Debug, Default)]
pub struct IssueLog {
    issues: Mutex<Vec<Issue>>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Issue>> {
        // A poisoned lock only means another writer panicked mid-push.
        self.issues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out every Issue in the order recorded.
    pub fn snapshot(&self) -> Vec<Issue> {
        self.guard().clone()
    }
}

impl IssueSink for IssueLog {
    fn record_issue(&self, issue: Issue) {
        warn!(
            line = issue.line_number,
            date = issue.date.as_deref(),
            boardings = issue.boardings,
            alightings = issue.alightings,
            "{}",
            issue.message
        );
        self.guard().push(issue);
    }
}

/// Issues sharing a message kind, with the ridership they account for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueGroup {
    pub kind: String,
    pub count: usize,
    pub missed_boardings: i64,
    pub missed_alightings: i64,
}

/// Reduces a message to its kind by collapsing every backticked value.
///
/// "Invalid RouteStop `Main & 1st` found" becomes "Invalid RouteStop `*` found".
pub fn message_kind(message: &str) -> String {
    let mut kind = String::with_capacity(message.len());
    let mut parts = message.split('`');

    if let Some(first) = parts.next() {
        kind.push_str(first);
    }
    let rest: Vec<&str> = parts.collect();
    // An unpaired backtick leaves the tail as-is.
    let paired = rest.len() - rest.len() % 2;
    for chunk in rest[..paired].chunks(2) {
        kind.push_str("`*`");
        kind.push_str(chunk[1]);
    }
    if paired < rest.len() {
        kind.push('`');
        kind.push_str(rest[paired]);
    }
    kind
}

/// Groups Issues by [`message_kind`], largest group first.
pub fn summarize(issues: &[Issue]) -> Vec<IssueGroup> {
    let mut groups: BTreeMap<String, IssueGroup> = BTreeMap::new();

    for issue in issues {
        let kind = message_kind(&issue.message);
        let group = groups.entry(kind.clone()).or_insert_with(|| IssueGroup {
            kind,
            ..Default::default()
        });
        group.count += 1;
        group.missed_boardings = group.missed_boardings.saturating_add(issue.boardings.unwrap_or(0));
        group.missed_alightings = group.missed_alightings.saturating_add(issue.alightings.unwrap_or(0));
    }

    let mut groups: Vec<IssueGroup> = groups.into_values().collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.kind.cmp(&b.kind)));
    groups
}
