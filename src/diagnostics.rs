// ABOUTME: Diagnostics accumulator for non-fatal warnings during promotion and rollback.
// ABOUTME: Collects outcomes that are committed but need a human to follow up.

/// Collects non-fatal warnings during an operation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn rollback_health_unconfirmed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::RollbackHealthUnconfirmed,
            message: message.into(),
        }
    }

    pub fn deploy_trigger_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::DeployTriggerFailed,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Rollback committed but the environment never reported healthy.
    RollbackHealthUnconfirmed,
    /// Ledger append committed but the deployment trigger failed.
    DeployTriggerFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::deploy_trigger_failed("webhook returned 502"));
        diag.warn(Warning::rollback_health_unconfirmed("prod not healthy after 2m"));

        assert_eq!(diag.warnings().len(), 2);
        assert!(diag.has(WarningKind::DeployTriggerFailed));
        assert!(diag.has(WarningKind::RollbackHealthUnconfirmed));
    }
}
