use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Blocks persistence of the dataset.
    Error,
    Warning,
    /// Informational data-quality note.
    Note,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Note => "note",
        }
    }
}

/// A data-quality finding raised during derivation or validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityIssue {
    pub dataset: String,
    /// Short rule identifier (e.g. "multiple-treatments").
    pub rule: String,
    pub severity: IssueSeverity,
    pub message: String,
    /// Identifying keys of the affected rows.
    #[serde(default)]
    pub keys: Vec<String>,
}

impl DataQualityIssue {
    pub fn new(
        dataset: impl Into<String>,
        rule: impl Into<String>,
        severity: IssueSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            rule: rule.into(),
            severity,
            message: message.into(),
            keys: Vec::new(),
        }
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.keys = keys;
        self
    }
}

/// Issues collected for one dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageReport {
    pub dataset: String,
    pub issues: Vec<DataQualityIssue>,
}

impl StageReport {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            issues: Vec::new(),
        }
    }

    pub fn push(&mut self, issue: DataQualityIssue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = DataQualityIssue>) {
        self.issues.extend(issues);
    }

    pub fn error_count(&self) -> usize {
        self.count(IssueSeverity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(IssueSeverity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn count(&self, severity: IssueSeverity) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == severity)
            .count()
    }
}
