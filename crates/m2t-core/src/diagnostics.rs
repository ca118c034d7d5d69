//! Structured exclusions and warnings collected during a pairing run.
//!
//! Partial AMI data is the expected steady state, so most data-quality findings are
//! absorbed rather than raised. Each finding names the stage that produced it and
//! the customers it concerns, so callers can report exactly who was left out.
//!
//! # Example
//!
//! ```
//! use m2t_core::{Category, CustomerId, Diagnostics};
//!
//! let mut diag = Diagnostics::new();
//! diag.warn_for(
//!     Category::NoVotes,
//!     "no usable correlation window",
//!     [CustomerId::new("meter_17")],
//! );
//! diag.warn(Category::Regression, "3 pair fits had too few complete samples");
//!
//! assert_eq!(diag.warning_count(), 2);
//! assert_eq!(diag.customers_in(Category::NoVotes).count(), 1);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::CustomerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Data was excluded but the run continued
    Warning,
    /// A stage could not produce its output
    Error,
}

/// Pipeline stage a finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Preprocess,
    NoVotes,
    Regression,
    Calibration,
    Reassignment,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Preprocess => "preprocess",
            Category::NoVotes => "no-votes",
            Category::Regression => "regression",
            Category::Calibration => "calibration",
            Category::Reassignment => "reassignment",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    /// Customers the finding applies to (two for a failed pair fit)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub customers: Vec<CustomerId>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, category: Category, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            customers: Vec::new(),
        }
    }

    pub fn for_customers(mut self, customers: impl IntoIterator<Item = CustomerId>) -> Self {
        self.customers.extend(customers);
        self
    }
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{severity}[{}] {}", self.category, self.message)?;
        if let Some((first, rest)) = self.customers.split_first() {
            write!(f, ": {first}")?;
            for customer in rest {
                write!(f, ", {customer}")?;
            }
        }
        Ok(())
    }
}

/// Findings of one run, in the order they were recorded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn warn(&mut self, category: Category, message: impl Into<String>) {
        self.push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn warn_for(
        &mut self,
        category: Category,
        message: impl Into<String>,
        customers: impl IntoIterator<Item = CustomerId>,
    ) {
        self.push(DiagnosticIssue::new(Severity::Warning, category, message).for_customers(customers));
    }

    pub fn error(&mut self, category: Category, message: impl Into<String>) {
        self.push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    /// Customers named under a category, in recording order.
    pub fn customers_in(&self, category: Category) -> impl Iterator<Item = &CustomerId> {
        self.in_category(category).flat_map(|i| i.customers.iter())
    }

    /// Issue count per category.
    pub fn counts_by_category(&self) -> BTreeMap<Category, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.category).or_insert(0) += 1;
        }
        counts
    }

    /// One-line summary, e.g. `2 warnings, 0 errors (no-votes: 1, regression: 1)`.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} warnings, {} errors",
            self.warning_count(),
            self.error_count()
        );
        let counts = self.counts_by_category();
        if !counts.is_empty() {
            let parts: Vec<String> = counts
                .iter()
                .map(|(category, n)| format!("{category}: {n}"))
                .collect();
            out.push_str(&format!(" ({})", parts.join(", ")));
        }
        out
    }

    pub fn to_json(&self) -> crate::M2tResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CustomerId {
        CustomerId::new(s)
    }

    #[test]
    fn summary_counts_per_category() {
        let mut diag = Diagnostics::new();
        assert!(diag.is_clean());
        assert_eq!(diag.summary(), "0 warnings, 0 errors");

        diag.warn(Category::NoVotes, "customer excluded");
        diag.warn(Category::Regression, "pair failed");
        diag.error(Category::Calibration, "no finite fit values");
        assert_eq!(
            diag.summary(),
            "2 warnings, 1 errors (no-votes: 1, regression: 1, calibration: 1)"
        );
        assert!(diag.has_errors());
    }

    #[test]
    fn customers_are_collected_per_category() {
        let mut diag = Diagnostics::new();
        diag.warn_for(Category::NoVotes, "excluded", [id("a")]);
        diag.warn_for(Category::Preprocess, "all samples missing", [id("a")]);
        diag.warn_for(Category::Regression, "too few samples", [id("b"), id("c")]);

        let excluded: Vec<&str> = diag
            .customers_in(Category::NoVotes)
            .map(|c| c.as_str())
            .collect();
        assert_eq!(excluded, vec!["a"]);
        assert_eq!(diag.customers_in(Category::Regression).count(), 2);
    }

    #[test]
    fn display_lists_customers() {
        let issue = DiagnosticIssue::new(Severity::Warning, Category::Regression, "singular fit")
            .for_customers([id("m1"), id("m2")]);
        assert_eq!(issue.to_string(), "warning[regression] singular fit: m1, m2");
    }

    #[test]
    fn json_uses_kebab_case_categories() {
        let mut diag = Diagnostics::new();
        diag.warn(Category::NoVotes, "excluded");
        let json = diag.to_json().unwrap();
        assert!(json.contains("\"no-votes\""));
        assert!(!json.contains("customers"));
    }
}
