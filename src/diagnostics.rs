//! Diagnostics
//!
//! Collects warnings and errors raised while parsing and resolving a schema.
//! Items keep traversal order so callers can rely on the sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Parse ===
    /// Input is not valid JSON
    InvalidJson,
    /// Input parsed but carries no schema keywords
    NotASchema,

    // === References ===
    /// Internal JSON Pointer does not resolve
    BrokenPointer,
    /// A `$ref` chain revisits itself within one branch
    CircularReference,
    /// External resolution depth budget reached
    DepthLimit,
    /// External file-count budget reached
    FileLimit,
    /// The fetch capability failed for an external document
    FetchFailed,
    /// A fetched document is not valid JSON
    InvalidFetchedDocument,
    /// External `$ref` found but no fetcher is configured
    ExternalRefUnavailable,
    /// Total `$ref` expansion budget reached
    ExpansionLimit,

    // === Keywords ===
    /// `pattern` does not compile
    InvalidPattern,
    /// A keyword value has the wrong JSON type and was skipped
    IgnoredKeyword,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "E001",
            Self::NotASchema => "E002",
            Self::BrokenPointer => "W001",
            Self::CircularReference => "W002",
            Self::DepthLimit => "W003",
            Self::FileLimit => "W004",
            Self::FetchFailed => "W005",
            Self::InvalidFetchedDocument => "W006",
            Self::ExternalRefUnavailable => "W007",
            Self::InvalidPattern => "W008",
            Self::IgnoredKeyword => "W009",
            Self::ExpansionLimit => "W010",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::InvalidJson | Self::NotASchema => Severity::Error,

            Self::BrokenPointer
            | Self::CircularReference
            | Self::DepthLimit
            | Self::FileLimit
            | Self::FetchFailed
            | Self::InvalidFetchedDocument
            | Self::ExternalRefUnavailable
            | Self::ExpansionLimit
            | Self::InvalidPattern
            | Self::IgnoredKeyword => Severity::Warning,
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
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Diagnostic code
    pub code: DiagnosticCode,
    /// Human-readable message
    pub message: String,
    /// Location in the source document, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl DiagnosticItem {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source_path: None,
        }
    }

    pub fn at(mut self, source_path: impl Into<String>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.code.severity(), self.message)?;
        if let Some(path) = &self.source_path {
            write!(f, " (at {})", path)?;
        }
        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Ordered collection of diagnostics from one parse call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic item
    pub fn push(&mut self, item: DiagnosticItem) {
        self.items.push(item);
    }

    /// Add an item by code and message
    pub fn report(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.push(DiagnosticItem::new(code, message));
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    /// Get all errors
    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    /// Get all warnings
    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Messages of all errors, in insertion order
    pub fn error_messages(&self) -> Vec<String> {
        self.errors().map(|i| i.message.clone()).collect()
    }

    /// Messages of all warnings, in insertion order
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings().map(|i| i.message.clone()).collect()
    }

    /// Whether any item carries `code`
    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.items.iter().any(|i| i.code == code)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
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

    /// Merge another Diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            writeln!(f, "{}", item)?;
        }
        if self.has_errors() {
            writeln!(
                f,
                "\n{} error(s), {} warning(s)",
                self.error_count(),
                self.warning_count()
            )?;
        } else if !self.is_empty() {
            writeln!(f, "\n{} warning(s)", self.warning_count())?;
        }
        Ok(())
    }
}

impl IntoIterator for Diagnostics {
    type Item = DiagnosticItem;
    type IntoIter = std::vec::IntoIter<DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::InvalidJson.severity(), Severity::Error);
        assert_eq!(DiagnosticCode::CircularReference.severity(), Severity::Warning);
    }

    #[test]
    fn test_messages_keep_insertion_order() {
        let mut diags = Diagnostics::new();
        diags.report(DiagnosticCode::BrokenPointer, "first");
        diags.report(DiagnosticCode::InvalidJson, "bad json");
        diags.report(DiagnosticCode::DepthLimit, "second");

        assert_eq!(diags.warning_messages(), vec!["first", "second"]);
        assert_eq!(diags.error_messages(), vec!["bad json"]);
        assert!(diags.has_errors());
        assert!(diags.contains(DiagnosticCode::DepthLimit));
    }

    #[test]
    fn test_display_includes_code_and_path() {
        let item = DiagnosticItem::new(DiagnosticCode::BrokenPointer, "missing").at("#/properties/a");
        assert_eq!(item.to_string(), "[W001] warning: missing (at #/properties/a)");
    }
}
