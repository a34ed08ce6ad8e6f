//! Physics configuration

use crate::error::{PhysicsError, Result};
use crate::material::CombineRule;
use serde::{Deserialize, Serialize};

/// Physics world configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity vector (default: -9.81 in Y)
    pub gravity: [f32; 3],

    /// Fixed timestep for physics simulation
    pub timestep: f32,

    /// Maximum number of substeps per frame
    pub max_substeps: u32,

    /// Side length of a broadphase grid cell on X and Z
    pub grid_cell_size: f32,

    /// Distance at which contacts are reported before shapes touch
    pub contact_prediction: f32,

    /// Penetration depth tolerated without positional correction
    pub penetration_slop: f32,

    /// Fraction of the remaining penetration removed per contact (0..1)
    pub position_correction: f32,

    /// Impact speed below which contacts do not bounce
    pub restitution_threshold: f32,

    /// Friction used by objects without a surface parameter
    pub default_friction: f32,

    /// Restitution used by objects without a surface parameter
    pub default_restitution: f32,

    /// How friction of two surfaces is combined
    pub friction_combine: CombineRule,

    /// How restitution of two surfaces is combined
    pub restitution_combine: CombineRule,

    /// Enable freezing of resting bodies
    pub sleeping_enabled: bool,

    /// Linear velocity threshold for freezing
    pub sleep_linear_threshold: f32,

    /// Angular velocity threshold for freezing
    pub sleep_angular_threshold: f32,

    /// Seconds a body must stay below the thresholds before it freezes
    pub freeze_time: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81, 0.0],
            timestep: 1.0 / 60.0,
            max_substeps: 4,
            grid_cell_size: 32.0,
            contact_prediction: 0.0,
            penetration_slop: 0.005,
            position_correction: 0.8,
            restitution_threshold: 1.0,
            default_friction: 0.5,
            default_restitution: 0.0,
            friction_combine: CombineRule::Average,
            restitution_combine: CombineRule::Max,
            sleeping_enabled: true,
            sleep_linear_threshold: 0.1,
            sleep_angular_threshold: 0.1,
            freeze_time: 0.5,
        }
    }
}

impl PhysicsConfig {
    /// Create a configuration for high-precision simulation
    pub fn high_precision() -> Self {
        Self {
            timestep: 1.0 / 120.0,
            max_substeps: 8,
            penetration_slop: 0.001,
            ..Default::default()
        }
    }

    /// Create a configuration for fast simulation (lower quality)
    pub fn fast() -> Self {
        Self {
            timestep: 1.0 / 30.0,
            max_substeps: 2,
            penetration_slop: 0.02,
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set gravity
    pub fn with_gravity(mut self, x: f32, y: f32, z: f32) -> Self {
        self.gravity = [x, y, z];
        self
    }

    /// Set timestep
    pub fn with_timestep(mut self, timestep: f32) -> Self {
        self.timestep = timestep;
        self
    }

    /// Set the broadphase cell size
    pub fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.grid_cell_size = cell_size;
        self
    }

    /// Check that the configuration can drive a simulation
    pub fn validate(&self) -> Result<()> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "timestep must be positive, got {}",
                self.timestep
            )));
        }
        if self.max_substeps == 0 {
            return Err(PhysicsError::InvalidConfig(
                "max_substeps must be at least 1".to_string(),
            ));
        }
        if !(self.grid_cell_size.is_finite() && self.grid_cell_size >= 1.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "grid_cell_size must be at least 1.0, got {}",
                self.grid_cell_size
            )));
        }
        if !(0.0..=1.0).contains(&self.position_correction) {
            return Err(PhysicsError::InvalidConfig(format!(
                "position_correction must be within 0..1, got {}",
                self.position_correction
            )));
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(PhysicsError::InvalidConfig("gravity must be finite".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PhysicsConfig::default().validate().is_ok());
        assert!(PhysicsConfig::high_precision().validate().is_ok());
        assert!(PhysicsConfig::fast().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_timestep() {
        let config = PhysicsConfig::default().with_timestep(0.0);
        assert!(matches!(config.validate(), Err(PhysicsError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_tiny_cells() {
        let config = PhysicsConfig::default().with_cell_size(0.25);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = PhysicsConfig::from_json(r#"{ "grid_cell_size": 16.0, "gravity": [0.0, -20.0, 0.0] }"#)
            .unwrap();
        assert_eq!(config.grid_cell_size, 16.0);
        assert_eq!(config.gravity, [0.0, -20.0, 0.0]);
        assert_eq!(config.max_substeps, 4);
    }

    #[test]
    fn test_from_json_validates() {
        assert!(PhysicsConfig::from_json(r#"{ "max_substeps": 0 }"#).is_err());
        assert!(matches!(
            PhysicsConfig::from_json("not json"),
            Err(PhysicsError::Parse(_))
        ));
    }
}
