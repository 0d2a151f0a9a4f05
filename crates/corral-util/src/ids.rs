//! Strongly-typed identifiers for corral

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Caller-chosen logical name of a tracked process
///
/// Distinct from the OS process id; unique within one supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessName(String);

impl ProcessName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProcessName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProcessName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&String> for ProcessName {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

impl Borrow<str> for ProcessName {
    fn borrow(&self) -> &str {
        &self.0
    }
}
