//! Deployment freeze gate

use crate::error::{Result, StackError};
use crate::model::Variant;
use chrono::{Datelike, Local, Weekday};

/// How a topology is being rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    /// Plan-only evaluation; nothing will be applied
    pub dry_run: bool,
    pub today: Weekday,
}

impl RenderContext {
    /// Context for a real apply, dated with the local clock
    pub fn apply() -> Self {
        Self {
            dry_run: false,
            today: Local::now().weekday(),
        }
    }

    /// Context for a preview
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            today: Local::now().weekday(),
        }
    }

    pub fn on(mut self, today: Weekday) -> Self {
        self.today = today;
        self
    }
}

/// Refuse a real deployment of a frozen variant on its freeze day
pub fn check_freeze(variant: Variant, ctx: &RenderContext) -> Result<()> {
    if ctx.dry_run {
        return Ok(());
    }
    match variant.freeze_day() {
        Some(day) if day == ctx.today => {
            tracing::warn!(%variant, %day, "Deployment freeze in effect");
            Err(StackError::DeploymentFrozen { day })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_on_friday_apply() {
        let ctx = RenderContext::apply().on(Weekday::Fri);
        let err = check_freeze(Variant::ContainerSql, &ctx).unwrap_err();
        assert!(err.is_frozen());
    }

    #[test]
    fn test_dry_run_ignores_freeze() {
        let ctx = RenderContext::dry_run().on(Weekday::Fri);
        assert!(check_freeze(Variant::ContainerSql, &ctx).is_ok());
    }

    #[test]
    fn test_other_days_and_variants_pass() {
        let thursday = RenderContext::apply().on(Weekday::Thu);
        assert!(check_freeze(Variant::ContainerSql, &thursday).is_ok());

        let friday = RenderContext::apply().on(Weekday::Fri);
        assert!(check_freeze(Variant::Vault, &friday).is_ok());
    }
}
