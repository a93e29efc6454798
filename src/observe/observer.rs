//! # Observer trait.
//!
//! `Observe` is the extension point for plugging custom report handlers into a
//! stage. Each observer is driven by its own worker fed by a bounded queue owned by
//! the [`ObserverSet`](super::ObserverSet).
//!
//! ## Contract
//! - Implementations may be slow; they never block actors, the stage loop or other
//!   observers.
//! - On queue overflow the report is dropped for that observer and an
//!   `ObserverOverflow` report is published.

use async_trait::async_trait;

use super::report::Report;

/// Contract for report observers.
///
/// Called from an observer-dedicated worker task.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Handle a single report.
    async fn on_report(&self, report: &Report);

    /// Human-readable name (for overflow/panic reports).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this observer's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
