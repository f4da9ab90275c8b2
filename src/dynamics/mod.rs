//! Simulation dynamics modules: integration, constraint solving, islands and soft bodies.

pub mod friction;
pub mod integrator;
pub mod island;
pub mod softbody;
pub mod solver;

pub use integrator::Integrator;
pub use island::{Island, IslandManager};
pub use softbody::{SoftBodySolver, SoftCollider, SoftPin};
pub use solver::{ConstraintSolver, SolverBody, SolverContact, SolverJoint, SolverStepMetrics};
