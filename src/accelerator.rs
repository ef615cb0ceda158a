//! Emulated accelerator runtime: platforms and devices, in-order command queues,
//! and the three kinds of device memory the Jacobi strategies are built on.
//! Kernels run on a rayon worker pool owned by each device.
pub mod device;
pub mod error;
pub mod memory;
pub mod queue;

pub use device::{Device, DeviceSpec, DeviceType, Platform, select_device};
pub use error::DeviceError;
pub use memory::{Allocation, Buffer, DeviceAlloc, MemObject, SharedAlloc};
pub use queue::{CommandKind, Event, Queue, QueueProperties};

/// Profiling-enabled queue on the device picked by `token` ("cpu", "gpu" or default).
pub fn create_device_queue_by_type(token: &str) -> Result<Queue, DeviceError> {
    let device = select_device(token)?;
    Ok(Queue::new(
        &device,
        QueueProperties {
            enable_profiling: true,
        },
    ))
}
