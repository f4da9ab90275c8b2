//! Global configuration constants and tunable parameter blocks.

use serde::{Deserialize, Serialize};

/// Default gravity vector applied in a new sector (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Default fixed sub-step duration (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Default cap on sub-steps performed by a single `step` call.
pub const DEFAULT_MAX_STEPS: u32 = 10;

/// Number of velocity iterations performed by the constraint solver.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 10;

/// Default damping applied to linear velocity.
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.0;

/// Default damping applied to angular velocity.
pub const DEFAULT_ROLLING_DAMPING: f32 = 0.0;

/// Default cell size for the broad-phase uniform grid (backend units).
pub const DEFAULT_BROADPHASE_CELL_SIZE: f32 = 5.0;

/// Default collision margin of a freshly created collider.
pub const DEFAULT_COLLIDER_MARGIN: f32 = 0.04;

/// Slack added to the remainder time so that accumulated frame times hit exact sub-step counts.
pub const TIME_ACCUMULATOR_EPSILON: f64 = 1e-6;

/// Maximum contact points kept per object pair.
pub const MAX_MANIFOLD_POINTS: usize = 8;

/// Distance under which a new contact inherits a cached impulse.
pub const CONTACT_MATCH_DISTANCE: f32 = 0.05;

/// Maximum portals a beam may traverse before giving up.
pub const MAX_PORTAL_HOPS: usize = 8;

/// Sub-step parameters of a sector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepParameters {
    pub time_step: f32,
    pub max_steps: u32,
    pub iterations: u32,
}

impl Default for StepParameters {
    fn default() -> Self {
        Self {
            time_step: DEFAULT_TIME_STEP,
            max_steps: DEFAULT_MAX_STEPS,
            iterations: DEFAULT_SOLVER_ITERATIONS,
        }
    }
}

/// Thresholds under which bodies are put to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDisableParams {
    pub linear_threshold: f32,
    pub angular_threshold: f32,
    pub time: f32,
}

impl Default for AutoDisableParams {
    fn default() -> Self {
        Self {
            linear_threshold: 0.8,
            angular_threshold: 1.0,
            time: 2.0,
        }
    }
}

/// Deformable tuning of a soft body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftBodyConfig {
    pub linear_stiffness: f32,
    pub angular_stiffness: f32,
    pub volume_stiffness: f32,
    pub damping: f32,
    pub pressure: f32,
    pub drag: f32,
    pub lift: f32,
    pub friction: f32,
    pub anchor_hardness: f32,
    pub position_iterations: u32,
    pub velocity_iterations: u32,
    pub node_radius: f32,
    pub soft_rigid_clusters: bool,
    pub soft_soft_clusters: bool,
}

impl Default for SoftBodyConfig {
    fn default() -> Self {
        Self {
            linear_stiffness: 1.0,
            angular_stiffness: 1.0,
            volume_stiffness: 1.0,
            damping: 0.0,
            pressure: 0.0,
            drag: 0.0,
            lift: 0.0,
            friction: 0.2,
            anchor_hardness: 1.0,
            position_iterations: 4,
            velocity_iterations: 0,
            node_radius: 0.05,
            soft_rigid_clusters: true,
            soft_soft_clusters: false,
        }
    }
}

impl SoftBodyConfig {
    /// Loose fabric-like preset.
    pub fn cloth() -> Self {
        Self {
            linear_stiffness: 0.9,
            angular_stiffness: 0.2,
            damping: 0.02,
            drag: 0.1,
            position_iterations: 8,
            ..Self::default()
        }
    }

    /// Stiff string preset.
    pub fn rope() -> Self {
        Self {
            linear_stiffness: 1.0,
            angular_stiffness: 0.0,
            damping: 0.01,
            position_iterations: 10,
            ..Self::default()
        }
    }
}
