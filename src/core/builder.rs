use std::sync::Arc;

use crate::actor::ActorSpec;
use crate::error::ConfigError;
use crate::observe::Observe;

use super::config::StageConfig;
use super::handle::StageHandle;
use super::stage::Stage;

/// Builder for a [`Stage`].
pub struct StageBuilder {
    name: String,
    cfg: StageConfig,
    actors: Vec<ActorSpec>,
    observers: Vec<Arc<dyn Observe>>,
}

impl StageBuilder {
    pub(crate) fn new(name: impl Into<String>, cfg: StageConfig) -> Self {
        Self {
            name: name.into(),
            cfg,
            actors: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Adds an actor, mounted in declaration order at `build`.
    pub fn actor(mut self, actor: ActorSpec) -> Self {
        self.actors.push(actor);
        self
    }

    /// Adds a report observer, driven by its own worker with a bounded queue.
    pub fn observer(mut self, observer: Arc<dyn Observe>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replaces the observer list.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// Compiles every actor and starts the observer workers.
    ///
    /// Must be called inside a tokio runtime. Structural problems (duplicate
    /// names, several initial states, bad handler patterns) are reported here,
    /// before anything runs.
    pub fn build(self) -> Result<Stage, ConfigError> {
        let (handle, inbox) = StageHandle::new(&self.name, self.cfg)?;
        let stage = Stage::new(handle, inbox, self.observers);
        for actor in self.actors {
            stage.handle().mount(actor)?;
        }
        Ok(stage)
    }
}
