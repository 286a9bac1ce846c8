//! Contacts queued between detection and response.

use super::simulation::BodyHandle;
use crate::collision::CollisionData;

/// A contact found in one step and resolved at the start of the next.
#[derive(Debug, Clone, Copy)]
pub struct Contact {
    pub data: CollisionData,
    pub body1: BodyHandle,
    /// `None` for contacts with static world geometry.
    pub body2: Option<BodyHandle>,
    /// Restitution: 0 absorbs, 1 bounces fully.
    pub epsilon: f32,
}
