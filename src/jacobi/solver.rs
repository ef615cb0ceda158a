//! Jacobi iteration driver.
//!
//! [`JacobiSolver`] owns the loop: snapshot the iterate, let the selected memory
//! strategy run one kernel, measure the relative change, stop when the change
//! drops to the target or the iteration cap is hit. The strategies only differ in
//! how they get A, b and the iterates to the device (see `accessor` and `usm`).
//!
//! A device failure ends the run of the strategy it happened in. The result then
//! carries the error together with the last iterate visible to the host.
use crate::accelerator::{DeviceError, Queue};
use crate::jacobi::accessor::AccessorScheme;
use crate::jacobi::metrics::relative_norm;
use crate::jacobi::usm::{DeviceScheme, SharedScheme};
use log::{debug, error, info, warn};
use std::time::Instant;
use strum_macros::{Display, EnumIter, EnumString};

/// Dense system `Ax = b`, `a` row-major `n × n`, `b` of length `n`.
/// Diagonal entries are expected to be non-zero and dominant; nothing checks it.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    pub a: Vec<f32>,
    pub b: Vec<f32>,
}

impl LinearSystem {
    pub fn new(a: Vec<f32>, b: Vec<f32>) -> Self {
        Self { a, b }
    }

    pub fn rows(&self) -> usize {
        self.b.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// hard cap on the number of kernel launches
    pub iterations_limit: usize,
    /// the loop stops once the relative change of the iterate is not above this
    pub accuracy_target: f32,
}

/// Outcome of one solver run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompResult {
    pub x: Vec<f32>,
    /// wall time of the iteration loop, ms
    pub elapsed: f64,
    pub iter: usize,
    /// relative change of the last iteration
    pub accuracy: f32,
    /// set when the run was cut short by the device
    pub error: Option<DeviceError>,
}

impl CompResult {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// How A, b and the iterates are made visible to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum MemoryStrategy {
    /// runtime-managed buffers, fresh iterate buffers every iteration
    #[strum(serialize = "accessor")]
    AccessorManaged,
    /// shared allocations addressable by host and device
    #[strum(serialize = "shared")]
    UnifiedShared,
    /// device-only allocations with host mirrors
    #[strum(serialize = "device")]
    DeviceExclusive,
}

impl MemoryStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            MemoryStrategy::AccessorManaged => "Accessor-Managed",
            MemoryStrategy::UnifiedShared => "Unified-Shared",
            MemoryStrategy::DeviceExclusive => "Device-Exclusive",
        }
    }
}

/// One Jacobi sweep as performed by a memory strategy.
pub trait IterationScheme {
    /// `x_prev := x_next`, one kernel launch producing the new `x_next`, host
    /// views of both iterates refreshed. Returns once the device is done.
    fn step(&mut self) -> Result<(), DeviceError>;

    /// host view of the iterate the last step started from
    fn x_prev(&self) -> &[f32];

    /// host view of the newest iterate
    fn x_next(&self) -> &[f32];
}

pub struct JacobiSolver<'a> {
    system: &'a LinearSystem,
    config: SolverConfig,
    queue: &'a Queue,
}

impl<'a> JacobiSolver<'a> {
    pub fn new(system: &'a LinearSystem, config: SolverConfig, queue: &'a Queue) -> Self {
        Self {
            system,
            config,
            queue,
        }
    }

    /// Solves the system with `strategy`. Device memory used by the strategy is
    /// released before this returns.
    pub fn solve(&self, strategy: MemoryStrategy) -> CompResult {
        info!(
            "{}: {} rows, target {:e}, at most {} iterations on '{}'",
            strategy.label(),
            self.system.rows(),
            self.config.accuracy_target,
            self.config.iterations_limit,
            self.queue.device().name()
        );
        if let Err(e) = self.queue.wait() {
            warn!(
                "{}: discarding a failure left on the queue by an earlier command: {}",
                strategy.label(),
                e
            );
        }
        let result = match strategy {
            MemoryStrategy::AccessorManaged => AccessorScheme::new(self.system, self.queue)
                .map(|scheme| self.iterate(scheme)),
            MemoryStrategy::UnifiedShared => SharedScheme::new(self.system, self.queue)
                .map(|scheme| self.iterate(scheme)),
            MemoryStrategy::DeviceExclusive => DeviceScheme::new(self.system, self.queue)
                .map(|scheme| self.iterate(scheme)),
        };
        let result = result.unwrap_or_else(|e| {
            error!("{}: setup failed: {}", strategy.label(), e);
            CompResult {
                x: self.system.b.clone(),
                elapsed: 0.0,
                iter: 0,
                accuracy: 0.0,
                error: Some(e),
            }
        });
        // a failure reported through an event may still be pending on the queue
        if let Err(e) = self.queue.wait() {
            debug!("{}: discarding queued failure: {}", strategy.label(), e);
        }
        match &result.error {
            None => info!(
                "{}: {} iterations, accuracy {:e}, {:.3} ms",
                strategy.label(),
                result.iter,
                result.accuracy,
                result.elapsed
            ),
            Some(e) => warn!(
                "{}: run aborted after {} iterations: {}",
                strategy.label(),
                result.iter,
                e
            ),
        }
        result
    }

    fn iterate<S: IterationScheme>(&self, mut scheme: S) -> CompResult {
        let SolverConfig {
            iterations_limit,
            accuracy_target,
        } = self.config;
        let mut iter = 0;
        let mut accuracy = 0.0f32;
        let mut failure = None;

        let begin = Instant::now();
        // the first sweep always runs: there is no accuracy before it
        while iter < iterations_limit && (iter == 0 || accuracy > accuracy_target) {
            if let Err(e) = scheme.step() {
                error!("kernel dispatch failed at iteration {}: {}", iter + 1, e);
                failure = Some(e);
                break;
            }
            accuracy = relative_norm(scheme.x_prev(), scheme.x_next());
            iter += 1;
            debug!("iteration {}: accuracy {:e}", iter, accuracy);
            if !accuracy.is_finite() {
                warn!(
                    "accuracy is {} at iteration {}: zero iterate or zero diagonal entry",
                    accuracy, iter
                );
            }
        }
        let elapsed = begin.elapsed().as_secs_f64() * 1000.0;

        CompResult {
            x: scheme.x_next().to_vec(),
            elapsed,
            iter,
            accuracy,
            error: failure,
        }
    }
}
