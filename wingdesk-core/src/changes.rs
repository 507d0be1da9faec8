use std::fmt::Display;

/// Human-readable list of field changes for the audit trail.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    changes: Vec<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` only if the value actually changed.
    pub fn field<T: PartialEq + Display>(mut self, name: &str, old: T, new: T) -> Self {
        if old != new {
            self.changes.push(format!("{}: {} -> {}", name, old, new));
        }
        self
    }

    /// Record a change without printing the values (passenger documents).
    pub fn redacted<T: PartialEq>(mut self, name: &str, old: &T, new: &T) -> Self {
        if old != new {
            self.changes.push(format!("{}: changed", name));
        }
        self
    }

    pub fn note(mut self, text: impl Into<String>) -> Self {
        self.changes.push(text.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn describe(&self) -> String {
        if self.changes.is_empty() {
            "no changes".to_string()
        } else {
            self.changes.join("; ")
        }
    }
}
