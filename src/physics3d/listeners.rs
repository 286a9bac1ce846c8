//! Listener lists that tolerate (de)registration from inside a callback.
//!
//! Additions and removals go to a pending queue and are applied right before
//! the next dispatch, so a listener can add or remove listeners (itself
//! included) while it is being called.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::lock;

/// Handle returned when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Called on the physics thread once per step, before the simulation step.
pub trait SimulationStepListener<S>: Send {
    fn step(&mut self, dt: f32, simulation_time: u32, simulation: &mut S);
}

/// Called from the host's system thread through [`super::Physics::update`].
pub trait SystemThreadListener: Send {
    fn system_update(&mut self, dt: f32);
}

struct Pending<L: ?Sized> {
    add: Vec<(ListenerId, Box<L>)>,
    remove: Vec<ListenerId>,
}

pub(crate) struct ListenerList<L: ?Sized> {
    active: Mutex<Vec<(ListenerId, Box<L>)>>,
    pending: Mutex<Pending<L>>,
    next_id: AtomicU64,
}

impl<L: ?Sized> ListenerList<L> {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(Vec::new()),
            pending: Mutex::new(Pending {
                add: Vec::new(),
                remove: Vec::new(),
            }),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn add(&self, listener: Box<L>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.pending).add.push((id, listener));
        id
    }

    /// Takes effect before the next dispatch.
    pub fn remove(&self, id: ListenerId) {
        lock(&self.pending).remove.push(id);
    }

    /// Apply pending changes, then call `f` on every listener in
    /// registration order.
    pub fn for_each(&self, mut f: impl FnMut(&mut L)) {
        let mut active = lock(&self.active);
        self.apply_pending(&mut active);
        for (_, listener) in active.iter_mut() {
            f(listener);
        }
    }

    pub fn len(&self) -> usize {
        let mut active = lock(&self.active);
        self.apply_pending(&mut active);
        active.len()
    }

    fn apply_pending(&self, active: &mut Vec<(ListenerId, Box<L>)>) {
        let mut pending = lock(&self.pending);
        active.append(&mut pending.add);
        if !pending.remove.is_empty() {
            let removed = std::mem::take(&mut pending.remove);
            active.retain(|(id, _)| !removed.contains(id));
        }
    }
}
