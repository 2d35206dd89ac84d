//! Diagnostics
//!
//! Collects non-fatal problems found while loading a schema set, so a
//! single bad definition is reported instead of aborting the whole load.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FmlError;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Parsing ===
    /// Non-primitive type without snapshot or differential
    MissingSnapshot,
    /// Element nests under a missing or non-nestable ancestor
    StructuralViolation,
    /// Element type entry without a code
    MissingTypeCode,
    /// Two non-slice elements share one path
    DuplicateElement,
    /// JSON could not be read as a definition
    InvalidDefinition,

    // === Type set ===
    /// Two definitions share a canonical url
    DuplicateUrl,
    /// baseDefinition names a type that was not loaded
    UnresolvedBase,

    // === Informational ===
    /// Constrained profile excluded from the type set
    ProfileSkipped,
    /// JSON resource that is neither a definition nor a value set
    UnsupportedResource,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingSnapshot => "E001",
            Self::StructuralViolation => "E002",
            Self::MissingTypeCode => "E003",
            Self::InvalidDefinition => "E004",
            Self::DuplicateElement => "E005",
            Self::DuplicateUrl => "W001",
            Self::UnresolvedBase => "W002",
            Self::ProfileSkipped => "I001",
            Self::UnsupportedResource => "I002",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::MissingSnapshot
            | Self::StructuralViolation
            | Self::MissingTypeCode
            | Self::DuplicateElement
            | Self::InvalidDefinition => Severity::Error,

            Self::DuplicateUrl | Self::UnresolvedBase => Severity::Warning,

            Self::ProfileSkipped | Self::UnsupportedResource => Severity::Info,
        }
    }

    /// Code for a parse failure
    pub fn for_error(err: &FmlError) -> Self {
        match err {
            FmlError::MissingSnapshot { .. } => Self::MissingSnapshot,
            FmlError::StructuralViolation { .. } => Self::StructuralViolation,
            FmlError::MissingTypeCode { .. } => Self::MissingTypeCode,
            FmlError::DuplicateElement { .. } => Self::DuplicateElement,
            _ => Self::InvalidDefinition,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// File or canonical url the diagnostic is about
    pub subject: String,
    pub code: DiagnosticCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(subject: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.subject
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from a load pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, item: DiagnosticItem) {
        self.items.push(item);
    }

    pub fn report(
        &mut self,
        subject: impl Into<String>,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) {
        self.push(DiagnosticItem::new(subject, code, message));
    }

    /// Record a definition that failed to parse
    pub fn parse_failure(&mut self, subject: impl Into<String>, err: &FmlError) {
        self.push(DiagnosticItem::new(
            subject,
            DiagnosticCode::for_error(err),
            err.to_string(),
        ));
    }

    /// Record a baseDefinition that points outside the loaded set
    pub fn unresolved_base(&mut self, url: impl Into<String>, base: &str) {
        self.push(
            DiagnosticItem::new(
                url,
                DiagnosticCode::UnresolvedBase,
                format!("baseDefinition '{}' is not loaded", base),
            )
            .with_context("the type becomes an extra hierarchy root"),
        );
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(move |i| i.code == code)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if self.has_errors() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        } else if self.warning_count() > 0 {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}
