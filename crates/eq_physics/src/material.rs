//! Surface parameters defining friction, restitution and tire grip
//!
//! Surfaces are registered once at load time into a flat table and looked
//! up by name or id afterwards. The world holds the table behind an `Arc`
//! so it stays immutable while simulations read it.

use crate::error::{PhysicsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index of a surface parameter within its table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceParamId(pub u32);

impl SurfaceParamId {
    /// Get the raw id value
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// A named surface preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceParam {
    /// Surface name (e.g. "asphalt", "dirt")
    pub name: String,
    /// Id assigned at registration
    #[serde(skip_deserializing)]
    pub id: SurfaceParamId,
    /// Restitution/bounciness (0 = no bounce, 1 = perfect bounce)
    pub restitution: f32,
    /// Friction coefficient for rigid contacts
    pub friction: f32,
    /// Tire friction coefficient
    pub tire_friction: f32,
    /// Tire traction coefficient
    pub tire_traction: f32,
    /// Single-character identifier used by level data
    pub word: char,
}

impl SurfaceParam {
    /// Create a new surface description
    pub fn new(name: impl Into<String>, friction: f32, restitution: f32) -> Self {
        Self {
            name: name.into(),
            id: SurfaceParamId::default(),
            restitution: restitution.clamp(0.0, 1.0),
            friction: friction.max(0.0),
            tire_friction: 1.0,
            tire_traction: 1.0,
            word: 'C',
        }
    }

    /// Set tire friction and traction
    pub fn with_tire(mut self, friction: f32, traction: f32) -> Self {
        self.tire_friction = friction;
        self.tire_traction = traction;
        self
    }

    /// Set the identifier character
    pub fn with_word(mut self, word: char) -> Self {
        self.word = word;
        self
    }
}

/// Flat table of surface parameters
#[derive(Debug, Clone, Default)]
pub struct SurfaceParamTable {
    params: Vec<SurfaceParam>,
    by_name: HashMap<String, SurfaceParamId>,
}

impl SurfaceParamTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from a JSON array of surface records
    pub fn from_json(text: &str) -> Result<Self> {
        let params: Vec<SurfaceParam> = serde_json::from_str(text)?;
        let mut table = Self::new();
        for param in params {
            table.register(param)?;
        }
        Ok(table)
    }

    /// Register a surface and assign its id. Names are case-insensitive.
    pub fn register(&mut self, mut param: SurfaceParam) -> Result<SurfaceParamId> {
        let key = param.name.to_ascii_lowercase();
        if self.by_name.contains_key(&key) {
            log::warn!("Surface parameter '{}' registered twice", param.name);
            return Err(PhysicsError::DuplicateSurfaceParam(param.name));
        }

        let id = SurfaceParamId(self.params.len() as u32);
        param.id = id;
        self.by_name.insert(key, id);
        self.params.push(param);
        Ok(id)
    }

    /// Find a surface by name
    pub fn find(&self, name: &str) -> Option<&SurfaceParam> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .and_then(|id| self.get(*id))
    }

    /// Get a surface by id
    pub fn get(&self, id: SurfaceParamId) -> Option<&SurfaceParam> {
        self.params.get(id.0 as usize)
    }

    /// Number of registered surfaces
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if no surfaces are registered
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate over all surfaces in id order
    pub fn iter(&self) -> impl Iterator<Item = &SurfaceParam> {
        self.params.iter()
    }
}

/// Rule for combining surface properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineRule {
    /// Use the average of both values
    #[default]
    Average,
    /// Use the minimum value
    Min,
    /// Use the maximum value
    Max,
    /// Multiply the values
    Multiply,
}

impl CombineRule {
    /// Combine two values using this rule
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Average => (a + b) * 0.5,
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Multiply => a * b,
        }
    }
}
