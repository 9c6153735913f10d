//! What a preflight run found.

use std::fmt;

/// Severity of one finding, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckStatus {
    Pass,
    /// Usable, but part of the image will be missing (e.g. `/etc/hostid`).
    Warn,
    /// A build would stop.
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "FAIL",
        })
    }
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            name: name.into(),
            status,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// All findings of one run, in the order they were checked.
#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    checks: Vec<CheckResult>,
}

impl PreflightReport {
    pub fn new(checks: Vec<CheckResult>) -> Self {
        Self { checks }
    }

    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    /// Most severe status seen; `Pass` for an empty report.
    pub fn worst(&self) -> CheckStatus {
        self.checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(CheckStatus::Pass)
    }

    /// True unless something would stop a build. Warnings are allowed.
    pub fn all_passed(&self) -> bool {
        self.worst() < CheckStatus::Fail
    }

    pub fn fail_count(&self) -> usize {
        self.tally(CheckStatus::Fail)
    }

    pub fn warn_count(&self) -> usize {
        self.tally(CheckStatus::Warn)
    }

    fn tally(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    pub fn print(&self) {
        print!("{}", self);
    }
}

impl fmt::Display for PreflightReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Preflight")?;
        let width = self.checks.iter().map(|c| c.name.len()).max().unwrap_or(0);
        for check in &self.checks {
            write!(f, "  [{:>4}] {:<width$}", check.status, check.name, width = width)?;
            match &check.details {
                Some(details) => writeln!(f, "  {}", details)?,
                None => writeln!(f)?,
            }
        }
        write!(
            f,
            "{} checks, {} failed, {} warnings",
            self.checks.len(),
            self.fail_count(),
            self.warn_count()
        )?;
        writeln!(f)
    }
}
