use serde::{Deserialize, Serialize};

// ─── Issue codes ──────────────────────────────────────────────────────────────

pub const UNSUPPORTED_UP_AXIS: &str = "UNSUPPORTED_UP_AXIS";
pub const UNSUPPORTED_TRANSFORM: &str = "UNSUPPORTED_TRANSFORM";
pub const MISSING_IMAGE: &str = "MISSING_IMAGE";
pub const MISSING_EFFECT: &str = "MISSING_EFFECT";
pub const INVALID_CHANNEL: &str = "INVALID_CHANNEL";
pub const JOINT_ARRAY_MISMATCH: &str = "JOINT_ARRAY_MISMATCH";
pub const UNRESOLVED_INSTANCE_NODE: &str = "UNRESOLVED_INSTANCE_NODE";
pub const IGNORED_INSTANCE: &str = "IGNORED_INSTANCE";
pub const UNRESOLVED_CHANNEL_TARGET: &str = "UNRESOLVED_CHANNEL_TARGET";
pub const INCOMPLETE_SKIN: &str = "INCOMPLETE_SKIN";
pub const UNMATCHED_SKIN_JOINT: &str = "UNMATCHED_SKIN_JOINT";
pub const UNRESOLVED_SKELETON: &str = "UNRESOLVED_SKELETON";
pub const MISSING_MATERIAL: &str = "MISSING_MATERIAL";
pub const NON_AFFINE_TRANSFORM: &str = "NON_AFFINE_TRANSFORM";
pub const ZERO_LENGTH_BASIS: &str = "ZERO_LENGTH_BASIS";
pub const NO_GEOMETRY: &str = "NO_GEOMETRY";
pub const DEGENERATE_TRIANGLES: &str = "DEGENERATE_TRIANGLES";

// ─── Types ────────────────────────────────────────────────────────────────────

/// Severity level used by conversion issues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single recoverable issue produced during parsing or conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

/// Collector for recoverable issues. Every entry is also forwarded to `log`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    issues: Vec<Issue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, code: &str, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[{code}] {message}");
        self.push(Severity::Warning, code, message);
    }

    pub fn info(&mut self, code: &str, message: impl Into<String>) {
        let message = message.into();
        log::info!("[{code}] {message}");
        self.push(Severity::Info, code, message);
    }

    fn push(&mut self, severity: Severity, code: &str, message: String) {
        self.issues.push(Issue {
            severity,
            code: code.to_string(),
            message,
        });
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }

    /// Number of recorded issues carrying `code`.
    pub fn count(&self, code: &str) -> usize {
        self.issues.iter().filter(|i| i.code == code).count()
    }

    pub fn has(&self, code: &str) -> bool {
        self.count(code) > 0
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_two_warnings_when_counting_by_code_then_only_matching_are_counted() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warn(MISSING_MATERIAL, "a");
        diagnostics.warn(MISSING_MATERIAL, "b");
        diagnostics.info(NO_GEOMETRY, "c");
        assert_eq!(diagnostics.count(MISSING_MATERIAL), 2);
        assert!(!diagnostics.has(ZERO_LENGTH_BASIS));
        assert_eq!(diagnostics.issues()[2].severity, Severity::Info);
    }
}
