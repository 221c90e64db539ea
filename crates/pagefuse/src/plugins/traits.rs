//! Base plugin trait definition.
//!
//! Every capability provider implements [`Plugin`], which carries identity and
//! lifecycle hooks. The capability traits in [`super::capabilities`] extend it.

use crate::Result;

/// Base trait that all capability providers must implement.
///
/// # Thread Safety
///
/// Plugins are shared across pages and regions processed concurrently, so
/// they must be `Send + Sync`.
///
/// # Example
///
/// ```rust
/// use pagefuse::plugins::Plugin;
/// use pagefuse::Result;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct LayoutModel {
///     loaded: AtomicBool,
/// }
///
/// impl Plugin for LayoutModel {
///     fn name(&self) -> &str {
///         "layout-model"
///     }
///
///     fn version(&self) -> String {
///         "0.3.1".to_string()
///     }
///
///     fn initialize(&self) -> Result<()> {
///         self.loaded.store(true, Ordering::Release);
///         Ok(())
///     }
///
///     fn shutdown(&self) -> Result<()> {
///         self.loaded.store(false, Ordering::Release);
///         Ok(())
///     }
/// }
/// ```
pub trait Plugin: Send + Sync {
    /// Unique, whitespace-free identifier used in logs and registry validation.
    fn name(&self) -> &str;

    fn version(&self) -> String;

    /// Called once when the capability registry is built.
    ///
    /// An error here makes the capability unavailable for the run; it is not
    /// propagated to the caller.
    fn initialize(&self) -> Result<()>;

    /// Called once from [`CapabilityRegistry::shutdown`](super::CapabilityRegistry::shutdown).
    fn shutdown(&self) -> Result<()>;

    fn description(&self) -> &str {
        ""
    }
}
