//! Synchronisation models decide how a physics instance keeps its state in
//! line with remote peers.
//!
//! Models are created by name through a [`SynchronisationModelRegistry`] so
//! hosts can plug in their own network strategies next to the built-in
//! standalone one.

use std::collections::HashMap;

use anyhow::Result;

use crate::error::{TesseraError, TesseraResult};

/// Name of the built-in standalone model.
pub const LOCAL_SYNCHRONISATION_MODEL: &str = "Local";

/// Per-step hooks a synchronisation strategy runs around the simulation.
///
/// `S` is the simulation the façade drives. All hooks run on the physics
/// thread while the step lock is held.
pub trait SynchronisationModel<S>: Send {
    fn name(&self) -> &str;

    /// Apply one queued network message.
    fn handle_message(&mut self, _message: &[u8], _simulation: &mut S) {}

    fn synchronise_before_step(&mut self, _simulation: &mut S) {}

    fn synchronise_after_step(&mut self, _simulation: &mut S, _simulation_time: u32) {}

    /// Whether this peer integrates physics itself when it is not the server.
    fn needs_physics_calculation(&self) -> bool {
        true
    }
}

/// Standalone model: nothing to exchange, always calculates.
#[derive(Debug, Default)]
pub struct LocalSynchronisationModel;

impl<S> SynchronisationModel<S> for LocalSynchronisationModel {
    fn name(&self) -> &str {
        LOCAL_SYNCHRONISATION_MODEL
    }
}

pub type SynchronisationModelFactory<S> =
    Box<dyn Fn() -> Result<Box<dyn SynchronisationModel<S>>> + Send + Sync>;

/// Named factories for synchronisation models.
pub struct SynchronisationModelRegistry<S> {
    factories: HashMap<String, SynchronisationModelFactory<S>>,
}

impl<S: 'static> SynchronisationModelRegistry<S> {
    /// A registry with no models at all.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry holding the built-in models.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(LOCAL_SYNCHRONISATION_MODEL, || {
            Ok(Box::new(LocalSynchronisationModel))
        });
        registry
    }

    /// Register a factory, replacing any previous one under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn SynchronisationModel<S>>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the model registered under `name`.
    pub fn create(&self, name: &str) -> TesseraResult<Box<dyn SynchronisationModel<S>>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TesseraError::UnknownSynchronisationModel(name.to_string()))?;
        factory().map_err(|e| TesseraError::ModelCreation {
            name: name.to_string(),
            reason: format!("{:#}", e),
        })
    }
}

impl<S: 'static> Default for SynchronisationModelRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
