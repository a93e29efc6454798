//! Runtime core: the stage, its shared handle, actor workers and shutdown.
//!
//! Internal modules:
//! - [`stage`]: routing loop, worker spawning, graceful shutdown;
//! - [`handle`]: shared stage state (queue, router, registry, bus, token);
//! - [`worker`]: the loop driving one actor;
//! - [`registry`]: mounted actors, staged or running;
//! - [`shutdown`]: OS termination signals;
//! - [`builder`]: [`StageBuilder`];
//! - [`config`]: [`StageConfig`].

mod builder;
mod config;
mod handle;
mod registry;
mod shutdown;
mod stage;
mod worker;

pub use builder::StageBuilder;
pub use config::StageConfig;
pub use handle::StageHandle;
pub use stage::Stage;
