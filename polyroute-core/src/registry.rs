use std::sync::Arc;

use parking_lot::RwLock;

use crate::controller::Controller;
use crate::error::Result;

/// Orchestrator holding the live controllers. Adding a controller binds
/// it; removing one unbinds it.
#[derive(Default)]
pub struct Registry {
    controllers: RwLock<Vec<Arc<Controller>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn add_controller(&self, controller: Arc<Controller>) -> Result<()> {
        controller.bind()?;
        self.controllers.write().push(controller);
        Ok(())
    }

    pub fn remove_controller(&self, controller: &Arc<Controller>) -> Result<()> {
        controller.unbind()?;
        self.controllers
            .write()
            .retain(|c| !Arc::ptr_eq(c, controller));
        Ok(())
    }

    pub fn controllers(&self) -> Vec<Arc<Controller>> {
        self.controllers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.controllers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.read().is_empty()
    }
}
