//! The unit of work handed to the step loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Extra argument carrying the full document for long-context tasks.
pub const CONTEXT_KEY: &str = "context";
/// Extra argument carrying the question to answer over the document.
pub const QUERY_KEY: &str = "query";

/// Free-form key/value arguments attached to a task.
pub type ExtraArgs = BTreeMap<String, String>;

/// A goal plus its arguments. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: Uuid,
    goal: String,
    extra_args: ExtraArgs,
    created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(goal: impl Into<String>, extra_args: ExtraArgs) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal: goal.into(),
            extra_args,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn extra_args(&self) -> &ExtraArgs {
        &self.extra_args
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.extra_args.get(key).map(String::as_str)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The document to decompose, if present and non-empty.
    pub fn context(&self) -> Option<&str> {
        self.arg(CONTEXT_KEY).filter(|c| !c.is_empty())
    }

    /// The question to answer, if present and non-blank.
    pub fn query(&self) -> Option<&str> {
        self.arg(QUERY_KEY).filter(|q| !q.trim().is_empty())
    }
}

/// Parse `key=value` pairs as given on the command line.
pub fn parse_extra_arg(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
