//! Fixed-step 3D physics façade.
//!
//! [`Physics`] owns a [`Simulation`] backend and steps it at a fixed rate,
//! either on its own thread ([`Physics::start`]) or driven from the host
//! loop ([`Physics::simulate`]). Every step runs, under one lock and in this
//! order: queued events, queued network messages, the object manager, step
//! listeners, pre-step synchronisation, the simulation step, post-step
//! synchronisation.

mod cursor_spring;
mod joint;
mod listeners;
mod sync;
mod world;

pub use cursor_spring::{
    ConnectionMode, CursorFeed, CursorHandle, CursorSpringConfig, CursorSpringConnector,
};
pub use joint::SpringDamperJoint;
pub use listeners::{ListenerId, SimulationStepListener, SystemThreadListener};
pub use sync::{
    LocalSynchronisationModel, SynchronisationModel, SynchronisationModelFactory,
    SynchronisationModelRegistry, LOCAL_SYNCHRONISATION_MODEL,
};
pub use world::{Body3d, BodyId, JointId, RigidWorld};

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use glam::Vec3;
use tracing::{debug, error, info, warn};

use crate::config::PhysicsModuleConfig;
use crate::error::{TesseraError, TesseraResult};
use listeners::ListenerList;

/// More catch-up steps than this in one loop iteration are reported.
const MAX_STEPS_PER_FRAME: u32 = 10;

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Recovering poisoned physics lock");
        poisoned.into_inner()
    })
}

/// Integrator variant of the simulation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepFunction {
    /// One full step.
    #[default]
    Step,
    /// Iterative solver; backends without one run a full step.
    QuickStep,
    /// The step split into `iterations` substeps.
    StepFast1 { iterations: u32 },
}

impl StepFunction {
    pub const DEFAULT_FAST_ITERATIONS: u32 = 1;

    /// Substeps one simulation step is divided into. Never 0.
    pub fn substeps(&self) -> u32 {
        match self {
            StepFunction::Step | StepFunction::QuickStep => 1,
            StepFunction::StepFast1 { iterations } => (*iterations).max(1),
        }
    }
}

/// Physics façade configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsConfig {
    /// Seconds per simulation step.
    pub step_size: f32,
    pub gravity: Vec3,
    /// Servers always integrate; clients only when their model asks for it.
    pub is_server: bool,
    /// Registry name of the synchronisation model.
    pub synchronisation_model: String,
    pub step_function: StepFunction,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            is_server: true,
            synchronisation_model: LOCAL_SYNCHRONISATION_MODEL.to_string(),
            step_function: StepFunction::Step,
        }
    }
}

/// A simulation backend the façade can drive.
pub trait Simulation: Send + 'static {
    fn set_gravity(&mut self, gravity: Vec3);
    fn set_step_size(&mut self, step_size: f32);
    fn set_step_function(&mut self, step_function: StepFunction);
    /// Advance by the configured step size.
    fn step(&mut self);
}

/// Creates and destroys physics objects on behalf of the host.
pub trait PhysicsObjectManager<S>: Send {
    fn step(&mut self, dt: f32, simulation: &mut S);

    fn is_server(&self) -> bool {
        true
    }
}

/// Work queued for the physics thread, run at the start of the next step.
pub type PhysicsEvent<S> = Box<dyn FnOnce(&mut PhysicsState<S>) + Send>;

/// Everything guarded by the step lock.
pub struct PhysicsState<S> {
    simulation: S,
    synchronisation_model: Box<dyn SynchronisationModel<S>>,
    registry: SynchronisationModelRegistry<S>,
    object_manager: Option<Box<dyn PhysicsObjectManager<S>>>,
    simulation_time: u32,
    is_server: bool,
}

impl<S: Simulation> PhysicsState<S> {
    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut S {
        &mut self.simulation
    }

    /// Steps taken so far.
    pub fn simulation_time(&self) -> u32 {
        self.simulation_time
    }

    pub fn synchronisation_model_name(&self) -> &str {
        self.synchronisation_model.name()
    }

    /// Switch to the model registered under `name`. On failure the current
    /// model stays in place.
    pub fn set_synchronisation_model(&mut self, name: &str) -> bool {
        match self.registry.create(name) {
            Ok(model) => {
                info!(
                    "Switching synchronisation model {} -> {}",
                    self.synchronisation_model.name(),
                    name
                );
                self.synchronisation_model = model;
                true
            }
            Err(e) => {
                warn!("Keeping synchronisation model {}: {}", self.synchronisation_model.name(), e);
                false
            }
        }
    }

    pub fn set_object_manager(&mut self, manager: Option<Box<dyn PhysicsObjectManager<S>>>) {
        self.object_manager = manager;
    }

    /// The object manager decides when present, the configuration otherwise.
    pub fn is_server(&self) -> bool {
        self.object_manager
            .as_ref()
            .map_or(self.is_server, |m| m.is_server())
    }

    fn does_physics_calculation(&self) -> bool {
        self.is_server() || self.synchronisation_model.needs_physics_calculation()
    }
}

/// Host-loop pacing state for [`Physics::simulate`].
#[derive(Debug)]
struct Pacer {
    last: Option<Instant>,
    time_to_next_step: f32,
}

/// Threaded fixed-step physics façade.
pub struct Physics<S> {
    state: Mutex<PhysicsState<S>>,
    events: Mutex<Vec<PhysicsEvent<S>>>,
    messages: Mutex<Vec<Vec<u8>>>,
    step_listeners: ListenerList<dyn SimulationStepListener<S>>,
    system_listeners: ListenerList<dyn SystemThreadListener>,
    step_size: f32,
    shutdown: AtomicBool,
    running: AtomicBool,
    /// Percentage of wall time spent stepping, as `f32` bits.
    load: AtomicU32,
    thread: Mutex<Option<JoinHandle<()>>>,
    pacer: Mutex<Pacer>,
}

impl<S: Simulation> Physics<S> {
    /// Set up `simulation` with the built-in synchronisation models.
    pub fn new(simulation: S, config: &PhysicsConfig) -> TesseraResult<Self> {
        Self::with_registry(simulation, config, SynchronisationModelRegistry::new())
    }

    /// Fails if `config.step_size` is not a finite positive number or if
    /// `config.synchronisation_model` cannot be created from `registry`.
    pub fn with_registry(
        mut simulation: S,
        config: &PhysicsConfig,
        registry: SynchronisationModelRegistry<S>,
    ) -> TesseraResult<Self> {
        if !(config.step_size.is_finite() && config.step_size > 0.0) {
            return Err(TesseraError::InvalidStepSize(config.step_size));
        }
        simulation.set_gravity(config.gravity);
        simulation.set_step_size(config.step_size);
        simulation.set_step_function(config.step_function);
        let synchronisation_model = registry.create(&config.synchronisation_model)?;
        info!(
            "Physics: step size {}s, {:?}, synchronisation model {}",
            config.step_size, config.step_function, config.synchronisation_model
        );

        Ok(Self {
            state: Mutex::new(PhysicsState {
                simulation,
                synchronisation_model,
                registry,
                object_manager: None,
                simulation_time: 0,
                is_server: config.is_server,
            }),
            events: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            step_listeners: ListenerList::new(),
            system_listeners: ListenerList::new(),
            step_size: config.step_size,
            shutdown: AtomicBool::new(false),
            running: AtomicBool::new(false),
            load: AtomicU32::new(0),
            thread: Mutex::new(None),
            pacer: Mutex::new(Pacer {
                last: None,
                time_to_next_step: config.step_size,
            }),
        })
    }

    /// Load a `<physics>` document and apply it over [`PhysicsConfig::default`].
    pub fn from_config_file(simulation: S, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let module = PhysicsModuleConfig::from_file(path)?;
        let config = module.to_physics_config(&PhysicsConfig::default());
        Self::new(simulation, &config)
            .with_context(|| format!("Failed to set up physics from {:?}", path))
    }

    pub fn step_size(&self) -> f32 {
        self.step_size
    }

    pub fn simulation_time(&self) -> u32 {
        lock(&self.state).simulation_time
    }

    /// Last measured share of wall time spent stepping, in percent.
    pub fn simulation_load(&self) -> f32 {
        f32::from_bits(self.load.load(Ordering::Relaxed))
    }

    /// Run `f` on the state under the step lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut PhysicsState<S>) -> R) -> R {
        f(&mut lock(&self.state))
    }

    /// Run `f` on the simulation under the step lock.
    pub fn with_simulation<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut lock(&self.state).simulation)
    }

    /// Queue work for the start of the next step.
    pub fn post_event(&self, event: PhysicsEvent<S>) {
        lock(&self.events).push(event);
    }

    /// Queue a network message for the synchronisation model.
    pub fn post_message(&self, message: Vec<u8>) {
        lock(&self.messages).push(message);
    }

    pub fn add_simulation_step_listener(
        &self,
        listener: Box<dyn SimulationStepListener<S>>,
    ) -> ListenerId {
        self.step_listeners.add(listener)
    }

    pub fn remove_simulation_step_listener(&self, id: ListenerId) {
        self.step_listeners.remove(id);
    }

    pub fn add_system_thread_listener(&self, listener: Box<dyn SystemThreadListener>) -> ListenerId {
        self.system_listeners.add(listener)
    }

    pub fn remove_system_thread_listener(&self, id: ListenerId) {
        self.system_listeners.remove(id);
    }

    /// Call the system thread listeners. The host calls this once per frame.
    pub fn update(&self, dt: f32) {
        self.system_listeners.for_each(|l| l.system_update(dt));
    }

    /// One fixed step.
    pub fn step(&self) {
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let events = std::mem::take(&mut *lock(&self.events));
        for event in events {
            event(&mut *state);
            debug!("Physics event executed");
        }

        let messages = std::mem::take(&mut *lock(&self.messages));
        for message in &messages {
            state
                .synchronisation_model
                .handle_message(message, &mut state.simulation);
        }

        if let Some(manager) = state.object_manager.as_mut() {
            manager.step(self.step_size, &mut state.simulation);
        }

        let simulation_time = state.simulation_time;
        self.step_listeners
            .for_each(|l| l.step(self.step_size, simulation_time, &mut state.simulation));

        state
            .synchronisation_model
            .synchronise_before_step(&mut state.simulation);
        if state.does_physics_calculation() {
            state.simulation.step();
        }
        state.simulation_time = state.simulation_time.wrapping_add(1);
        state
            .synchronisation_model
            .synchronise_after_step(&mut state.simulation, state.simulation_time);
    }

    /// Step as often as the time since the last call requires. For hosts
    /// that drive physics from their own loop instead of [`Self::start`].
    /// Returns the number of steps taken.
    pub fn simulate(&self) -> u32 {
        let now = Instant::now();
        let mut pacer = lock(&self.pacer);
        let dt = pacer
            .last
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        pacer.last = Some(now);
        pacer.time_to_next_step -= dt;

        let mut steps = 0;
        while pacer.time_to_next_step <= 0.0 {
            self.step();
            pacer.time_to_next_step += self.step_size;
            steps += 1;
        }
        if steps > MAX_STEPS_PER_FRAME {
            warn!("Physics fell behind: {} steps in one frame", steps);
        }
        steps
    }

    /// Whether the physics thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the physics thread. Returns `false` if it is already running or
    /// could not be spawned.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut thread = lock(&self.thread);
        if thread.is_some() {
            warn!("Physics thread already started");
            return false;
        }
        self.shutdown.store(false, Ordering::Release);
        self.running.store(true, Ordering::Release);

        let physics = Arc::clone(self);
        match std::thread::Builder::new()
            .name("physics".to_string())
            .spawn(move || physics.run())
        {
            Ok(handle) => {
                *thread = Some(handle);
                info!("Physics thread started");
                true
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                error!("Failed to spawn physics thread: {}", e);
                false
            }
        }
    }

    /// Stop the physics thread and wait for it. The current step always
    /// completes.
    pub fn kill(&self) {
        self.shutdown.store(true, Ordering::Release);
        while self.running.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(1));
        }
        if let Some(handle) = lock(&self.thread).take() {
            if handle.join().is_err() {
                error!("Physics thread panicked");
            }
            info!("Physics thread stopped");
        }
    }

    fn run(&self) {
        let mut time_to_next_step = self.step_size;
        let mut last = Instant::now();
        let mut fps_counter = 0u32;
        let mut fps_time = 0.0f32;
        let mut sleep_time = 0.0f32;
        let mut slept = false;

        while !self.shutdown.load(Ordering::Acquire) {
            let now = Instant::now();
            let dt = now.duration_since(last).as_secs_f32();
            last = now;
            time_to_next_step -= dt;
            fps_time += dt;
            if slept {
                sleep_time += dt;
                slept = false;
            }

            if fps_time >= 1.0 {
                let load = (fps_time - sleep_time) * 100.0;
                self.load.store(load.to_bits(), Ordering::Relaxed);
                info!(
                    "Physics: FPS = {} / LOAD: {:.2}% (simulation time = {})",
                    fps_counter,
                    load,
                    self.simulation_time()
                );
                fps_counter = 0;
                fps_time = 0.0;
                sleep_time = 0.0;
            }

            if time_to_next_step > 0.0 {
                std::thread::sleep(Duration::from_secs_f32(time_to_next_step));
                slept = true;
                continue;
            }

            let mut steps = 0;
            while time_to_next_step <= 0.0 {
                self.step();
                time_to_next_step += self.step_size;
                fps_counter += 1;
                steps += 1;
            }
            if steps > MAX_STEPS_PER_FRAME {
                warn!("Physics fell behind: {} steps in one iteration", steps);
            }
        }
        self.running.store(false, Ordering::Release);
    }
}
