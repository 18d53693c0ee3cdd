use crate::{core::scope::Scope, errors::WindowError};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open time range `[start, end)` of posted events, optionally narrowed to a scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchWindow {
    pub scope: Scope,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(scope: Scope, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, WindowError> {
        if start >= end {
            return Err(WindowError::Inverted {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { scope, start, end })
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Reporting period holding the whole window, `None` when it spans more than one month.
    pub fn period(&self) -> Option<Period> {
        let last = self.end - Duration::nanoseconds(1);
        let period = Period::of(self.start);
        (Period::of(last) == period).then_some(period)
    }

    /// Splits the window into consecutive sub-windows no longer than `max_span`.
    ///
    /// The pieces share the scope, cover the original range exactly and do not overlap.
    pub fn split(&self, max_span: Duration) -> Result<Vec<FetchWindow>, WindowError> {
        if max_span <= Duration::zero() {
            return Err(WindowError::EmptySpan);
        }

        let mut parts = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let next = cursor
                .checked_add_signed(max_span)
                .map_or(self.end, |next| next.min(self.end));
            parts.push(Self {
                scope: self.scope.clone(),
                start: cursor,
                end: next,
            });
            cursor = next;
        }
        Ok(parts)
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {})",
            self.scope,
            self.start.to_rfc3339(),
            self.end.to_rfc3339()
        )
    }
}

/// Calendar month (UTC) used to key downstream per-period totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn of(ts: DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
