//! Explicit-copy strategies over pointer-style allocations.
//!
//! `UsmScheme<SharedAlloc>` is the unified-shared variant and
//! `UsmScheme<DeviceAlloc>` the device-exclusive one. Both allocate A, b and the
//! two iterates once, upload them, then per iteration:
//! copy x_next -> x_prev on the device, launch the kernel, copy both iterates
//! back into host mirrors. Every command is waited on before the next one is
//! issued. The allocations are owned by the scheme and are released when it is
//! dropped, whichever way the run ends.
use crate::accelerator::{Allocation, DeviceAlloc, DeviceError, Queue, SharedAlloc};
use crate::jacobi::kernel::jacobi_kernel;
use crate::jacobi::solver::{IterationScheme, LinearSystem};
use log::debug;

pub type SharedScheme<'a> = UsmScheme<'a, SharedAlloc>;
pub type DeviceScheme<'a> = UsmScheme<'a, DeviceAlloc>;

pub struct UsmScheme<'a, M: Allocation> {
    queue: &'a Queue,
    a: M,
    b: M,
    x_prev: M,
    x_next: M,
    host_prev: Vec<f32>,
    host_next: Vec<f32>,
}

impl<'a, M: Allocation> UsmScheme<'a, M> {
    pub fn new(system: &LinearSystem, queue: &'a Queue) -> Result<Self, DeviceError> {
        let n = system.rows();
        let device = queue.device();
        let scheme = Self {
            queue,
            a: M::allocate(device, system.a.len())?,
            b: M::allocate(device, n)?,
            x_prev: M::allocate(device, n)?,
            x_next: M::allocate(device, n)?,
            host_prev: vec![0.0; n],
            host_next: system.b.clone(),
        };
        debug!(
            "{} allocations for {} rows on '{}'",
            M::RESIDENCY,
            n,
            device.name()
        );
        queue.memcpy_to_device(&scheme.a, &system.a)?.wait()?;
        queue.memcpy_to_device(&scheme.b, &system.b)?.wait()?;
        queue.memcpy_to_device(&scheme.x_next, &system.b)?.wait()?;
        Ok(scheme)
    }
}

impl<M: Allocation> IterationScheme for UsmScheme<'_, M> {
    fn step(&mut self) -> Result<(), DeviceError> {
        let n = self.host_next.len();
        self.queue.memcpy(&self.x_prev, &self.x_next)?.wait()?;
        self.queue
            .parallel_for(n, &[&self.a, &self.b, &self.x_prev], &self.x_next, jacobi_kernel(n))?;
        self.queue.wait()?;
        self.queue
            .memcpy_to_host(&mut self.host_prev, &self.x_prev)?
            .wait()?;
        self.queue
            .memcpy_to_host(&mut self.host_next, &self.x_next)?
            .wait()
    }

    fn x_prev(&self) -> &[f32] {
        &self.host_prev
    }

    fn x_next(&self) -> &[f32] {
        &self.host_next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::{Device, DeviceSpec, DeviceType, MemObject, QueueProperties};

    fn queue() -> Queue {
        let device = Device::new(DeviceSpec {
            name: "usm test device".to_string(),
            device_type: DeviceType::Gpu,
            compute_units: 2,
            max_work_group_size: 256,
            global_mem_bytes: 1 << 20,
        })
        .unwrap();
        Queue::new(&device, QueueProperties::default())
    }

    fn system() -> LinearSystem {
        LinearSystem::new(
            vec![10.0, 1.0, 1.0, 1.0, 10.0, 1.0, 1.0, 1.0, 10.0],
            vec![12.0, 12.0, 12.0],
        )
    }

    fn assert_bitwise_eq(host: &[f32], device: &[f32]) {
        assert_eq!(host.len(), device.len());
        for (h, d) in host.iter().zip(device) {
            assert_eq!(h.to_bits(), d.to_bits());
        }
    }

    #[test]
    fn test_device_mirror_round_trip_is_exact() {
        let q = queue();
        let system = system();
        let mut scheme = DeviceScheme::new(&system, &q).unwrap();
        for _ in 0..5 {
            scheme.step().unwrap();
        }
        assert_bitwise_eq(scheme.x_next(), &scheme.x_next.storage().snapshot());
        assert_bitwise_eq(scheme.x_prev(), &scheme.x_prev.storage().snapshot());
    }

    #[test]
    fn test_shared_mirror_round_trip_is_exact() {
        let q = queue();
        let system = system();
        let mut scheme = SharedScheme::new(&system, &q).unwrap();
        for _ in 0..5 {
            scheme.step().unwrap();
        }
        assert_bitwise_eq(scheme.x_next(), &scheme.x_next.host_read().unwrap());
    }

    #[test]
    fn test_setup_uploads_initial_guess() {
        let q = queue();
        let system = system();
        let scheme = SharedScheme::new(&system, &q).unwrap();
        assert_eq!(*scheme.x_next.host_read().unwrap(), system.b);
        assert_eq!(*scheme.a.host_read().unwrap(), system.a);
        assert_eq!(q.submissions(), 3);
        assert_eq!(q.kernel_launches(), 0);
    }

    #[test]
    fn test_allocations_released_when_scheme_dropped() {
        let q = queue();
        let system = system();
        {
            let mut scheme = DeviceScheme::new(&system, &q).unwrap();
            scheme.step().unwrap();
            assert_eq!(q.device().allocated_bytes(), (9 + 3 * 3) * 4);
        }
        assert_eq!(q.device().allocated_bytes(), 0);
    }

    #[test]
    fn test_step_issues_copy_kernel_and_two_readbacks() {
        let q = queue();
        let system = system();
        let mut scheme = DeviceScheme::new(&system, &q).unwrap();
        let before = q.submissions();
        scheme.step().unwrap();
        assert_eq!(q.submissions() - before, 4);
        assert_eq!(q.kernel_launches(), 1);
        // the four allocations of the setup are reused by every step
        scheme.step().unwrap();
        assert_eq!(q.device().allocation_count(), 4);
    }
}
