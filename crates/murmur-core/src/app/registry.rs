//! Backend registry: one backend per origin type.
//!
//! Built during wiring (mutable), then shared read-only by the executor, so no
//! lock is needed on the hot path.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::ports::{Backend, OriginType};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate backend for origin_type={0}")]
    DuplicateBackend(OriginType),
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<OriginType, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        origin_type: OriginType,
        backend: Arc<dyn Backend>,
    ) -> Result<(), RegistryError> {
        if self.backends.contains_key(&origin_type) {
            return Err(RegistryError::DuplicateBackend(origin_type));
        }
        self.backends.insert(origin_type, backend);
        Ok(())
    }

    pub fn get(&self, origin_type: OriginType) -> Option<&Arc<dyn Backend>> {
        self.backends.get(&origin_type)
    }

    pub fn registered_types(&self) -> Vec<OriginType> {
        let mut types: Vec<OriginType> = self.backends.keys().copied().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
