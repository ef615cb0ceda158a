//! different utility modules used by the benchmark programs
/// TOML configuration of the benchmark programs
pub mod config;
/// random diagonally dominant systems
pub mod equation_system;
/// terminal and file logging
pub mod logger;
/// comparison table of the memory strategies
pub mod report;
/// tiny module to get system information - a pretty-printing wrapper around sys-info plus the device list
pub mod sys_info;
