//! Jacobi iterative solver for dense systems on the accelerator, with three
//! interchangeable ways of managing device memory.
/// accessor-managed strategy built on runtime buffers
pub mod accessor;
/// the per-row update launched on the device
pub mod kernel;
/// relative norm and deviation
pub mod metrics;
/// iteration driver, problem and result types
pub mod solver;
/// unified-shared and device-exclusive strategies
pub mod usm;

pub use metrics::{deviation, relative_norm};
pub use solver::{CompResult, JacobiSolver, LinearSystem, MemoryStrategy, SolverConfig};
