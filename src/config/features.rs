//! Feature flags configuration

use serde::Deserialize;

/// Feature flags for enabling/disabling functionality
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    /// Allow the checkout return page to trigger order completion after
    /// re-verifying payment state with the provider. The webhook path is
    /// always active; this flag only controls the UX accelerant.
    #[serde(default = "default_enable_return_reconciliation")]
    pub enable_return_reconciliation: bool,

    /// Show detailed error messages (disable in production!)
    #[serde(default)]
    pub verbose_errors: bool,

    /// Enable request tracing
    #[serde(default = "default_enable_tracing")]
    pub enable_tracing: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_return_reconciliation: default_enable_return_reconciliation(),
            verbose_errors: false,
            enable_tracing: default_enable_tracing(),
        }
    }
}

fn default_enable_return_reconciliation() -> bool {
    true
}

fn default_enable_tracing() -> bool {
    true
}
