//! Accessor-managed strategy: runtime buffers, no explicit copies.
//!
//! The matrix and right-hand side are wrapped in buffers once per run. Each
//! iteration wraps the two host iterates in fresh buffers, launches the kernel
//! with read set {A, b, x_prev} and write set {x_next}, and lets the buffers go
//! out of scope: their destruction waits for the kernel and writes `x_next` back
//! into host memory, after which the host may read it.
use crate::accelerator::{Buffer, DeviceError, Queue};
use crate::jacobi::kernel::jacobi_kernel;
use crate::jacobi::solver::{IterationScheme, LinearSystem};

pub struct AccessorScheme<'a> {
    queue: &'a Queue,
    a: Buffer<'a>,
    b: Buffer<'a>,
    x_prev: Vec<f32>,
    x_next: Vec<f32>,
}

impl<'a> AccessorScheme<'a> {
    pub fn new(system: &'a LinearSystem, queue: &'a Queue) -> Result<Self, DeviceError> {
        Ok(Self {
            queue,
            a: Buffer::from_slice(queue.device(), &system.a)?,
            b: Buffer::from_slice(queue.device(), &system.b)?,
            x_prev: Vec::new(),
            x_next: system.b.clone(),
        })
    }
}

impl IterationScheme for AccessorScheme<'_> {
    fn step(&mut self) -> Result<(), DeviceError> {
        self.x_prev.clone_from(&self.x_next);
        let n = self.x_next.len();
        let x_prev = Buffer::from_slice(self.queue.device(), &self.x_prev)?;
        let x_next = Buffer::from_mut(self.queue.device(), &mut self.x_next)?;
        self.queue
            .parallel_for(n, &[&self.a, &self.b, &x_prev], &x_next, jacobi_kernel(n))?;
        // x_next reaches host memory when its buffer is dropped at the end of the step
        self.queue.wait()
    }

    fn x_prev(&self) -> &[f32] {
        &self.x_prev
    }

    fn x_next(&self) -> &[f32] {
        &self.x_next
    }
}
