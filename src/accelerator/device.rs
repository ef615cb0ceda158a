//! Platforms and devices of the emulated accelerator.
//!
//! The host exposes a single platform with two devices: the CPU itself and an
//! emulated GPU. Both execute kernels on their own rayon thread pool, they differ
//! in work-group limits and memory capacity. A device keeps track of the bytes
//! allocated on it so that every memory object can be accounted for.
use crate::accelerator::error::DeviceError;
use log::{debug, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use strum_macros::{Display, EnumIter};

const HOST_PLATFORM_NAME: &str = "RustedJacobi Host Platform";
const FALLBACK_MEMORY_BYTES: usize = 4 << 30;
const EMULATED_GPU_MEMORY_BYTES: usize = 2 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum DeviceType {
    #[strum(serialize = "cpu")]
    Cpu,
    #[strum(serialize = "gpu")]
    Gpu,
}

/// Static description of a device, used to build it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSpec {
    pub name: String,
    pub device_type: DeviceType,
    /// number of worker threads executing work-items
    pub compute_units: usize,
    pub max_work_group_size: usize,
    pub global_mem_bytes: usize,
}

#[derive(Debug)]
struct DeviceInner {
    id: usize,
    spec: DeviceSpec,
    allocated: AtomicUsize,
    allocations: AtomicUsize,
    pool: ThreadPool,
}

/// Handle to a compute device. Cloning is cheap, clones refer to the same device.
#[derive(Debug, Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

static NEXT_DEVICE_ID: AtomicUsize = AtomicUsize::new(0);

impl Device {
    pub fn new(spec: DeviceSpec) -> Result<Self, DeviceError> {
        let id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        let pool = ThreadPoolBuilder::new()
            .num_threads(spec.compute_units.max(1))
            .thread_name(move |i| format!("device-{}-cu-{}", id, i))
            .build()
            .map_err(|e| DeviceError::ThreadPool(e.to_string()))?;
        debug!(
            "device #{} '{}' started with {} compute units",
            id, spec.name, spec.compute_units
        );
        Ok(Self {
            inner: Arc::new(DeviceInner {
                id,
                spec,
                allocated: AtomicUsize::new(0),
                allocations: AtomicUsize::new(0),
                pool,
            }),
        })
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn device_type(&self) -> DeviceType {
        self.inner.spec.device_type
    }

    pub fn compute_units(&self) -> usize {
        self.inner.spec.compute_units
    }

    pub fn max_work_group_size(&self) -> usize {
        self.inner.spec.max_work_group_size
    }

    pub fn global_mem_bytes(&self) -> usize {
        self.inner.spec.global_mem_bytes
    }

    /// bytes currently held by live memory objects of this device
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated.load(Ordering::Acquire)
    }

    /// number of memory objects ever created on this device
    pub fn allocation_count(&self) -> usize {
        self.inner.allocations.load(Ordering::Acquire)
    }

    pub fn is_same(&self, other: &Device) -> bool {
        self.id() == other.id()
    }

    pub(crate) fn reserve(&self, bytes: usize) -> Result<(), DeviceError> {
        let capacity = self.global_mem_bytes();
        self.inner
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= capacity)
            })
            .map(|_| {
                self.inner.allocations.fetch_add(1, Ordering::AcqRel);
            })
            .map_err(|used| DeviceError::OutOfMemory {
                requested: bytes,
                available: capacity.saturating_sub(used),
            })
    }

    pub(crate) fn release(&self, bytes: usize) {
        let previous = self.inner.allocated.fetch_sub(bytes, Ordering::AcqRel);
        if previous < bytes {
            warn!(
                "device #{} released {} bytes but only {} were allocated",
                self.id(),
                bytes,
                previous
            );
        }
    }

    /// Runs `op` inside the worker pool of the device.
    pub(crate) fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.inner.pool.install(op)
    }
}

/// A group of devices sharing a runtime.
#[derive(Debug, Clone)]
pub struct Platform {
    name: String,
    devices: Vec<Device>,
}

static PLATFORMS: OnceLock<Result<Vec<Platform>, DeviceError>> = OnceLock::new();

impl Platform {
    /// All platforms visible to the process. Devices are created once and shared.
    pub fn get_platforms() -> Result<Vec<Platform>, DeviceError> {
        PLATFORMS.get_or_init(Self::discover).clone()
    }

    fn discover() -> Result<Vec<Platform>, DeviceError> {
        let cores = sys_info::cpu_num()
            .map(|n| n as usize)
            .unwrap_or_else(|_| std::thread::available_parallelism().map_or(1, |n| n.get()));
        let host_memory = sys_info::mem_info()
            .map(|info| (info.total as usize).saturating_mul(1024))
            .unwrap_or(FALLBACK_MEMORY_BYTES);
        let cpu = Device::new(DeviceSpec {
            name: format!("Host CPU ({} cores)", cores),
            device_type: DeviceType::Cpu,
            compute_units: cores,
            max_work_group_size: 8192,
            global_mem_bytes: host_memory,
        })?;
        let gpu = Device::new(DeviceSpec {
            name: "Emulated GPU".to_string(),
            device_type: DeviceType::Gpu,
            compute_units: cores,
            max_work_group_size: 256,
            global_mem_bytes: EMULATED_GPU_MEMORY_BYTES.min(host_memory),
        })?;
        Ok(vec![Platform {
            name: HOST_PLATFORM_NAME.to_string(),
            devices: vec![cpu, gpu],
        }])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }
}

/// Picks a device by token: "cpu", "gpu", anything else selects the default device
/// (a GPU when present, the CPU otherwise).
pub fn select_device(token: &str) -> Result<Device, DeviceError> {
    let platforms = Platform::get_platforms()?;
    let devices: Vec<&Device> = platforms.iter().flat_map(|p| p.devices().iter()).collect();
    let of_type = |t: DeviceType| devices.iter().find(|d| d.device_type() == t).copied();
    let found = match token {
        "cpu" => of_type(DeviceType::Cpu),
        "gpu" => of_type(DeviceType::Gpu),
        _ => of_type(DeviceType::Gpu).or_else(|| devices.first().copied()),
    };
    found
        .cloned()
        .ok_or_else(|| DeviceError::NoDevice(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_device(capacity: usize) -> Device {
        Device::new(DeviceSpec {
            name: "test device".to_string(),
            device_type: DeviceType::Cpu,
            compute_units: 2,
            max_work_group_size: 64,
            global_mem_bytes: capacity,
        })
        .unwrap()
    }

    #[test]
    fn test_reserve_and_release_accounting() {
        let device = small_device(100);
        device.reserve(60).unwrap();
        assert_eq!(device.allocated_bytes(), 60);
        let err = device.reserve(50).unwrap_err();
        assert_eq!(
            err,
            DeviceError::OutOfMemory {
                requested: 50,
                available: 40
            }
        );
        // failed reservation leaves the counters untouched
        assert_eq!(device.allocated_bytes(), 60);
        assert_eq!(device.allocation_count(), 1);
        device.release(60);
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn test_device_ids_are_unique() {
        let a = small_device(10);
        let b = small_device(10);
        assert!(!a.is_same(&b));
        assert!(a.is_same(&a.clone()));
    }

    #[test]
    fn test_select_device_by_token() {
        let cpu = select_device("cpu").unwrap();
        assert_eq!(cpu.device_type(), DeviceType::Cpu);
        let gpu = select_device("gpu").unwrap();
        assert_eq!(gpu.device_type(), DeviceType::Gpu);
        // default selector prefers the GPU
        let default = select_device("anything").unwrap();
        assert!(default.is_same(&gpu));
        // platforms are discovered once
        assert!(select_device("cpu").unwrap().is_same(&cpu));
    }

    #[test]
    fn test_platform_lists_both_device_types() {
        let platforms = Platform::get_platforms().unwrap();
        assert_eq!(platforms.len(), 1);
        assert_eq!(platforms[0].name(), HOST_PLATFORM_NAME);
        let types: Vec<String> = platforms[0]
            .devices()
            .iter()
            .map(|d| d.device_type().to_string())
            .collect();
        assert_eq!(types, vec!["cpu", "gpu"]);
    }
}
