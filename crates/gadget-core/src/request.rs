//! The launch/creation request payload.
//!
//! A [`Request`] is the bundle of string extras a caller hands to
//! `create()`; the manager deep-clones it (plain [`Clone`]) and retains the
//! copy for the instance's whole life, passing it to every module
//! operation. Results travel the same way, optionally tagged with a
//! [`ResultCode`] under [`RESULT_DATA_KEY`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reserved extras key carrying the textual result code added by
/// `send_result_full`.
pub const RESULT_DATA_KEY: &str = "__gadget_result__";

/// Outcome code attached to a result payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Succeeded,
    Failed,
    Canceled,
}

impl ResultCode {
    pub fn code(self) -> i32 {
        match self {
            ResultCode::Succeeded => 0,
            ResultCode::Failed => -1,
            ResultCode::Canceled => -2,
        }
    }
}

/// String-keyed extras bundle exchanged between host, manager and modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    extras: BTreeMap<String, String>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.extras.is_empty()
    }

    pub fn len(&self) -> usize {
        self.extras.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extras.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.extras.remove(key)
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.extras.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Request {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Request {
            extras: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_deep() {
        let mut a = Request::new().with("caller", "phone");
        let b = a.clone();
        a.set("caller", "mail");
        assert_eq!(b.get("caller"), Some("phone"));
        assert_eq!(a.get("caller"), Some("mail"));
    }

    #[test]
    fn json_round_trip_preserves_extras() {
        let req = Request::new().with("k", "v").with("n", "1");
        let text = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&text).unwrap();
        assert_eq!(back, req);
    }
}
