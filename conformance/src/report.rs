//! Conformance report types: findings, severity levels, and aggregation.
//!
//! A clean check produces no findings. Each validator records the checks it
//! ran and emits one [`Finding`] per offence, carrying the offending entity
//! id structurally so callers can act on it without parsing messages.

use std::fmt;

/// Severity of a conformance finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Non-blocking: the document verifies but defeats a downstream policy.
    Warning,
    /// Blocking: the document is not conformant.
    Failure,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Failure => f.write_str("failure"),
        }
    }
}

/// A single offence reported by a conformance check.
#[derive(Debug, Clone)]
pub struct Finding {
    /// Short identifier of the check that produced this finding.
    pub check: &'static str,
    /// Severity of the finding.
    pub severity: Severity,
    /// Id of the offending entity, when the offence is tied to one.
    pub entity: Option<String>,
    /// Human-readable description of the offence.
    pub message: String,
}

impl Finding {
    /// Returns true if this finding blocks conformance.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.severity == Severity::Failure
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Some(entity) => write!(
                f,
                "[{}] {}: `{entity}`: {}",
                self.severity, self.check, self.message
            ),
            None => write!(f, "[{}] {}: {}", self.severity, self.check, self.message),
        }
    }
}

/// Aggregated conformance report from all validators.
///
/// Records which checks ran alongside the findings they produced, so an
/// empty findings list from four recorded checks means a clean document,
/// not a skipped suite.
#[derive(Debug, Default)]
pub struct ConformanceReport {
    checks: Vec<&'static str>,
    findings: Vec<Finding>,
}

impl ConformanceReport {
    /// Creates a new empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `check` ran, whether or not it produced findings.
    pub fn record_check(&mut self, check: &'static str) {
        self.checks.push(check);
    }

    /// Records a warning against `entity` (or the document as a whole).
    pub fn warn(&mut self, check: &'static str, entity: Option<&str>, message: impl Into<String>) {
        self.findings.push(Finding {
            check,
            severity: Severity::Warning,
            entity: entity.map(str::to_owned),
            message: message.into(),
        });
    }

    /// Records a failure against `entity` (or the document as a whole).
    pub fn fail(&mut self, check: &'static str, entity: Option<&str>, message: impl Into<String>) {
        self.findings.push(Finding {
            check,
            severity: Severity::Failure,
            entity: entity.map(str::to_owned),
            message: message.into(),
        });
    }

    /// Merges another report's checks and findings into this one.
    pub fn extend(&mut self, other: ConformanceReport) {
        self.checks.extend(other.checks);
        self.findings.extend(other.findings);
    }

    /// The checks that ran, in execution order.
    #[must_use]
    pub fn checks(&self) -> &[&'static str] {
        &self.checks
    }

    /// Every finding, in the order the checks produced them.
    #[must_use]
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// The findings produced by one check.
    pub fn findings_for<'a>(&'a self, check: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.check == check)
    }

    /// Returns the count of blocking findings.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.findings.iter().filter(|f| f.is_failure()).count()
    }

    /// Returns the count of warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .count()
    }

    /// Returns true if no finding blocks conformance.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failure_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn findings_carry_the_offending_entity() {
        let mut report = ConformanceReport::new();
        report.record_check("references");
        report.fail("references", Some("node3"), "references missing OTU `t9`");
        let finding = &report.findings()[0];
        assert_eq!(finding.entity.as_deref(), Some("node3"));
        assert_eq!(
            finding.to_string(),
            "[failure] references: `node3`: references missing OTU `t9`"
        );
    }

    #[test]
    fn warnings_do_not_block_conformance() {
        let mut report = ConformanceReport::new();
        report.record_check("merge-policy");
        report.warn("merge-policy", Some("otus2"), "duplicates `otus1`");
        assert!(report.all_passed());
        assert_eq!(report.warning_count(), 1);
        assert_eq!(report.findings_for("merge-policy").count(), 1);
    }
}
