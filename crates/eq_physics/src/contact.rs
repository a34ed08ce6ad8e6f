//! Contact and query result data
//!
//! [`ContactPair`] is produced by step collision detection and updated by
//! contact resolution. [`CollisionPairData`] is the same contact seen from
//! one object and is stored in that object's collision list.
//! [`CollisionData`] is filled by line and sweep queries.

use crate::arena::ObjectHandle;
use crate::material::SurfaceParamId;
use crossbeam_channel::{Receiver, Sender};
use rapier3d::parry::math::{Point, Real, Vector};
use std::ops::{BitOr, BitOrAssign};

/// Flags carried by a contact pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContactPairFlags(u32);

impl ContactPairFlags {
    pub const NONE: Self = Self(0);
    /// Consumers should not play impact sounds
    pub const NO_SOUND: Self = Self(1 << 0);
    /// Body A must not be affected by resolution
    pub const BODY_A_NO_RESPONSE: Self = Self(1 << 1);
    /// Body B must not be affected by resolution
    pub const BODY_B_NO_RESPONSE: Self = Self(1 << 2);
    /// Reserved for game code
    pub const USER_1: Self = Self(1 << 16);
    pub const USER_2: Self = Self(1 << 17);
    pub const USER_3: Self = Self(1 << 18);
    pub const USER_4: Self = Self(1 << 19);

    /// Both bodies excluded from resolution
    pub const NO_RESPONSE: Self = Self(Self::BODY_A_NO_RESPONSE.0 | Self::BODY_B_NO_RESPONSE.0);

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if all flags in `other` are set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if any flag in `other` is set
    pub const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// The same flags with the A and B sides exchanged
    pub fn swapped(self) -> Self {
        let mut flags = Self(self.0 & !Self::NO_RESPONSE.0);
        if self.contains(Self::BODY_A_NO_RESPONSE) {
            flags.insert(Self::BODY_B_NO_RESPONSE);
        }
        if self.contains(Self::BODY_B_NO_RESPONSE) {
            flags.insert(Self::BODY_A_NO_RESPONSE);
        }
        flags
    }
}

impl BitOr for ContactPairFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ContactPairFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Order-independent identity of a body pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(ObjectHandle, ObjectHandle);

impl PairKey {
    pub fn new(a: ObjectHandle, b: ObjectHandle) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn first(&self) -> ObjectHandle {
        self.0
    }

    pub fn second(&self) -> ObjectHandle {
        self.1
    }
}

/// A detected contact between two objects
#[derive(Debug, Clone, Copy)]
pub struct ContactPair {
    /// Contact point in world space
    pub position: Point<Real>,
    /// Contact normal, pointing from body B toward body A
    pub normal: Vector<Real>,
    /// First body (always dynamic)
    pub body_a: ObjectHandle,
    /// Second body
    pub body_b: ObjectHandle,
    /// Combined restitution
    pub restitution: Real,
    /// Combined friction
    pub friction: Real,
    /// Penetration depth (positive when overlapping)
    pub depth: Real,
    /// Normal impulse applied by resolution
    pub applied_impulse: Real,
    /// Closing speed along the normal at the time of contact
    pub impact_velocity: Real,
    /// Pair flags
    pub flags: ContactPairFlags,
}

impl ContactPair {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.body_a, self.body_b)
    }

    /// The other body of the pair
    pub fn other(&self, handle: ObjectHandle) -> Option<ObjectHandle> {
        if handle == self.body_a {
            Some(self.body_b)
        } else if handle == self.body_b {
            Some(self.body_a)
        } else {
            None
        }
    }

    /// Check if resolution is disabled for either side
    pub fn is_response_disabled(&self) -> bool {
        self.flags.intersects(ContactPairFlags::NO_RESPONSE)
    }

    /// The contact as seen from body A
    pub fn for_body_a(&self) -> CollisionPairData {
        CollisionPairData {
            position: self.position,
            normal: self.normal,
            body_a: self.body_a,
            body_b: self.body_b,
            depth: self.depth,
            applied_impulse: self.applied_impulse,
            impact_velocity: self.impact_velocity,
            flags: self.flags,
        }
    }

    /// The contact as seen from body B (normal and sides flipped)
    pub fn for_body_b(&self) -> CollisionPairData {
        CollisionPairData {
            position: self.position,
            normal: -self.normal,
            body_a: self.body_b,
            body_b: self.body_a,
            depth: self.depth,
            applied_impulse: self.applied_impulse,
            impact_velocity: self.impact_velocity,
            flags: self.flags.swapped(),
        }
    }
}

/// A contact stored in one object's collision list
#[derive(Debug, Clone, Copy)]
pub struct CollisionPairData {
    /// Contact point in world space
    pub position: Point<Real>,
    /// Normal pointing toward the owning object
    pub normal: Vector<Real>,
    /// The owning object
    pub body_a: ObjectHandle,
    /// The other object
    pub body_b: ObjectHandle,
    /// Penetration depth
    pub depth: Real,
    /// Normal impulse applied by resolution
    pub applied_impulse: Real,
    /// Closing speed along the normal
    pub impact_velocity: Real,
    /// Pair flags, from the owner's side
    pub flags: ContactPairFlags,
}

/// Output of line and sweep queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionData {
    /// Hit point in world space
    pub position: Point<Real>,
    /// Surface normal at the hit point
    pub normal: Vector<Real>,
    /// Object hit, `None` if nothing was hit
    pub hit_object: Option<ObjectHandle>,
    /// Fraction of the segment travelled before the hit (1.0 = no hit)
    pub fract: Real,
    /// Surface at the hit point, `None` if unknown
    pub material_index: Option<SurfaceParamId>,
}

impl Default for CollisionData {
    fn default() -> Self {
        Self {
            position: Point::origin(),
            normal: Vector::zeros(),
            hit_object: None,
            fract: 1.0,
            material_index: None,
        }
    }
}

impl CollisionData {
    /// Check if a hit was recorded
    pub fn has_hit(&self) -> bool {
        self.hit_object.is_some()
    }
}

/// Fan-out of resolved contacts to channel subscribers
#[derive(Default)]
pub(crate) struct ContactEventHub {
    senders: Vec<Sender<ContactPair>>,
}

impl ContactEventHub {
    pub fn subscribe(&mut self) -> Receiver<ContactPair> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.senders.push(sender);
        receiver
    }

    /// Send every pair to every live subscriber, dropping disconnected ones
    pub fn publish(&mut self, pairs: &[ContactPair]) {
        if pairs.is_empty() {
            return;
        }
        self.senders
            .retain(|sender| pairs.iter().all(|pair| sender.send(*pair).is_ok()));
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }
}
