use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::external::provider::{DataSource, ProviderError};
use crate::models::{Provenance, ProvenanceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Empty,
    Unsupported,
    Error,
}

/// One provider tried while resolving a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttempt {
    pub source: DataSource,
    pub outcome: AttemptOutcome,
    pub detail: Option<String>,
}

impl SourceAttempt {
    pub fn empty(source: DataSource) -> Self {
        Self { source, outcome: AttemptOutcome::Empty, detail: None }
    }

    pub fn from_error(source: DataSource, error: &ProviderError) -> Self {
        let outcome = match error {
            ProviderError::Unsupported => AttemptOutcome::Unsupported,
            ProviderError::NotFound => AttemptOutcome::Empty,
            _ => AttemptOutcome::Error,
        };
        Self { source, outcome, detail: Some(error.to_string()) }
    }
}

/// Result of asking the provider chain for one piece of data.
///
/// `Unavailable` means every provider answered without data; `Failed` means at
/// least one of them errored and none had data.
#[derive(Debug, Clone, PartialEq)]
pub enum Sourced<T> {
    Available {
        data: T,
        source: DataSource,
        fetched_at: DateTime<Utc>,
    },
    Unavailable {
        attempts: Vec<SourceAttempt>,
    },
    Failed {
        attempts: Vec<SourceAttempt>,
    },
}

impl<T> Sourced<T> {
    pub fn available(data: T, source: DataSource) -> Self {
        Sourced::Available { data, source, fetched_at: Utc::now() }
    }

    pub fn from_attempts(attempts: Vec<SourceAttempt>) -> Self {
        if attempts.iter().any(|a| a.outcome == AttemptOutcome::Error) {
            Sourced::Failed { attempts }
        } else {
            Sourced::Unavailable { attempts }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Sourced::Available { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Sourced::Available { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Sourced::Available { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<DataSource> {
        match self {
            Sourced::Available { source, .. } => Some(*source),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        match self {
            Sourced::Available { data, source, fetched_at } => {
                Sourced::Available { data: f(data), source, fetched_at }
            }
            Sourced::Unavailable { attempts } => Sourced::Unavailable { attempts },
            Sourced::Failed { attempts } => Sourced::Failed { attempts },
        }
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            Sourced::Available { source, fetched_at, .. } => Provenance {
                status: ProvenanceStatus::Available,
                source: Some(*source),
                fetched_at: Some(*fetched_at),
                detail: None,
            },
            Sourced::Unavailable { attempts } => Provenance {
                status: ProvenanceStatus::Unavailable,
                source: None,
                fetched_at: None,
                detail: describe(attempts),
            },
            Sourced::Failed { attempts } => Provenance {
                status: ProvenanceStatus::Failed,
                source: None,
                fetched_at: None,
                detail: describe(attempts),
            },
        }
    }
}

fn describe(attempts: &[SourceAttempt]) -> Option<String> {
    if attempts.is_empty() {
        return Some("no provider configured".to_string());
    }
    let parts: Vec<String> = attempts
        .iter()
        .map(|a| match &a.detail {
            Some(detail) => format!("{}: {}", a.source, detail),
            None => format!("{}: no data", a.source),
        })
        .collect();
    Some(parts.join("; "))
}

/// What counts as "the provider had data" for a given payload.
pub trait DataPresence {
    type Output;

    fn into_present(self) -> Option<Self::Output>;
}

impl<T> DataPresence for Vec<T> {
    type Output = Vec<T>;

    fn into_present(self) -> Option<Self::Output> {
        if self.is_empty() { None } else { Some(self) }
    }
}

impl DataPresence for Option<f64> {
    type Output = f64;

    fn into_present(self) -> Option<Self::Output> {
        self.filter(|v| v.is_finite() && *v > 0.0)
    }
}
