//! example programs built on the accelerator runtime
/// platform and device enumeration with a tiny kernel per device
pub mod hello;
/// midpoint integral with work-group reduction
pub mod integral;
/// comparison of the Jacobi memory strategies
pub mod jacobi_bench;
