use std::fmt::Display;

use arcstr::ArcStr;
use colored::Colorize;
use serde::Serialize;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single result of a structural check.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    /// The cell in which the finding was made.
    pub cell: ArcStr,
    /// A short machine-readable identifier, such as `port_count_mismatch`.
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct Report {
    pub findings: Vec<Finding>,
}

impl Report {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        severity: Severity,
        cell: impl Into<ArcStr>,
        code: &'static str,
        message: impl Into<String>,
    ) {
        self.findings.push(Finding {
            severity,
            cell: cell.into(),
            code,
            message: message.into(),
        });
    }

    pub fn error(&mut self, cell: impl Into<ArcStr>, code: &'static str, message: impl Into<String>) {
        self.push(Severity::Error, cell, code, message);
    }

    pub fn warning(
        &mut self,
        cell: impl Into<ArcStr>,
        code: &'static str,
        message: impl Into<String>,
    ) {
        self.push(Severity::Warning, cell, code, message);
    }

    pub fn info(&mut self, cell: impl Into<ArcStr>, code: &'static str, message: impl Into<String>) {
        self.push(Severity::Info, cell, code, message);
    }

    pub fn extend(&mut self, other: Report) {
        self.findings.extend(other.findings);
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(move |f| f.severity == severity)
    }

    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Finding> {
        self.findings.iter().filter(move |f| f.code == code)
    }

    #[inline]
    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.with_severity(Severity::Error)
    }

    /// True if the report contains no errors.
    ///
    /// Warnings and informational findings do not count.
    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "{}", "info".blue().bold()),
            Self::Warning => write!(f, "{}", "warning".yellow().bold()),
            Self::Error => write!(f, "{}", "error".red().bold()),
        }
    }
}

impl Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.severity, self.code, self.cell, self.message
        )
    }
}
