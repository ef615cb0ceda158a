use std::fmt;

/// Errors reported by the accelerator runtime: allocation, transfers and kernel dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// allocation would exceed the global memory of the device
    OutOfMemory { requested: usize, available: usize },
    /// source and destination of a transfer differ in length
    SizeMismatch { expected: usize, found: usize },
    /// the same memory object is both read and written by one command
    AliasedAccess,
    /// memory object belongs to another device than the queue
    WrongDevice { queue: usize, memory: usize },
    /// command failed while executing on the device
    DeviceLost(String),
    /// launch range does not fit the memory objects or the work-group shape
    InvalidRange(String),
    /// a lock guarding device storage was poisoned by a panicking kernel
    PoisonedStorage,
    /// no device matches the requested selector
    NoDevice(String),
    /// the worker pool of a device could not be created
    ThreadPool(String),
    /// event timestamps were requested from a queue created without profiling
    ProfilingDisabled,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceError::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of device memory: requested {} bytes, {} bytes available",
                requested, available
            ),
            DeviceError::SizeMismatch { expected, found } => {
                write!(f, "size mismatch: expected {} elements, found {}", expected, found)
            }
            DeviceError::AliasedAccess => {
                write!(f, "memory object is both read and written by one command")
            }
            DeviceError::WrongDevice { queue, memory } => write!(
                f,
                "memory allocated on device #{} used on a queue of device #{}",
                memory, queue
            ),
            DeviceError::DeviceLost(msg) => write!(f, "device lost: {}", msg),
            DeviceError::InvalidRange(msg) => write!(f, "invalid range: {}", msg),
            DeviceError::PoisonedStorage => write!(f, "device storage lock poisoned"),
            DeviceError::NoDevice(selector) => {
                write!(f, "no device matches selector '{}'", selector)
            }
            DeviceError::ThreadPool(msg) => write!(f, "failed to start device workers: {}", msg),
            DeviceError::ProfilingDisabled => {
                write!(f, "profiling info requested from a queue without profiling enabled")
            }
        }
    }
}

impl std::error::Error for DeviceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let oom = DeviceError::OutOfMemory {
            requested: 64,
            available: 16,
        };
        assert_eq!(
            oom.to_string(),
            "out of device memory: requested 64 bytes, 16 bytes available"
        );
        assert_eq!(
            DeviceError::NoDevice("gpu".to_string()).to_string(),
            "no device matches selector 'gpu'"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(DeviceError::AliasedAccess);
        assert!(boxed.to_string().contains("both read and written"));
    }
}
