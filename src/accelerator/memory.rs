//! Memory objects of the emulated accelerator.
//!
//! Three kinds of memory, all of `f32`:
//! - [`Buffer`]: runtime-managed storage created over host data. The runtime
//!   remembers the last command touching it; dropping the buffer waits for that
//!   command and writes the contents back to the host slice (when it was created
//!   writable).
//! - [`SharedAlloc`]: a shared allocation, readable and writable both from the
//!   host and from kernels.
//! - [`DeviceAlloc`]: a device-only allocation. The host reaches it exclusively
//!   through queue copies.
//!
//! Every object reserves its size on the owning device at creation and releases
//! it exactly once, when the last handle to its storage is dropped.
use crate::accelerator::device::Device;
use crate::accelerator::error::DeviceError;
use crate::accelerator::queue::Event;
use log::{error, warn};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Backing storage shared by all memory object kinds.
#[derive(Debug)]
pub struct Storage {
    id: u64,
    device: Device,
    len: usize,
    bytes: usize,
    data: RwLock<Vec<f32>>,
    last_event: Mutex<Option<Event>>,
}

impl Storage {
    fn allocate(device: &Device, data: Vec<f32>) -> Result<Arc<Self>, DeviceError> {
        let bytes = data.len() * std::mem::size_of::<f32>();
        device.reserve(bytes)?;
        Ok(Arc::new(Self {
            id: NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed),
            device: device.clone(),
            len: data.len(),
            bytes,
            data: RwLock::new(data),
            last_event: Mutex::new(None),
        }))
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, Vec<f32>>, DeviceError> {
        self.data.read().map_err(|_| DeviceError::PoisonedStorage)
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<f32>>, DeviceError> {
        self.data.write().map_err(|_| DeviceError::PoisonedStorage)
    }

    pub(crate) fn record(&self, event: &Event) {
        if let Ok(mut last) = self.last_event.lock() {
            *last = Some(event.clone());
        }
    }

    fn last_event(&self) -> Option<Event> {
        self.last_event.lock().ok().and_then(|last| last.clone())
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<f32> {
        self.read().map(|data| data.clone()).unwrap_or_default()
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        self.device.release(self.bytes);
    }
}

/// Anything a command on a queue can read from or write to.
pub trait MemObject {
    #[doc(hidden)]
    fn storage(&self) -> &Storage;

    fn len(&self) -> usize {
        self.storage().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn device(&self) -> &Device {
        self.storage().device()
    }
}

#[derive(Debug)]
enum HostRef<'a> {
    ReadOnly(PhantomData<&'a [f32]>),
    Writable(&'a mut [f32]),
}

/// Runtime-managed buffer over host memory.
#[derive(Debug)]
pub struct Buffer<'a> {
    storage: Arc<Storage>,
    host: HostRef<'a>,
}

impl<'a> Buffer<'a> {
    /// Buffer initialized from `host`, never written back.
    pub fn from_slice(device: &Device, host: &'a [f32]) -> Result<Self, DeviceError> {
        Ok(Self {
            storage: Storage::allocate(device, host.to_vec())?,
            host: HostRef::ReadOnly(PhantomData),
        })
    }

    /// Buffer initialized from `host` whose final contents are copied back into
    /// `host` when the buffer is dropped.
    pub fn from_mut(device: &Device, host: &'a mut [f32]) -> Result<Self, DeviceError> {
        let storage = Storage::allocate(device, host.to_vec())?;
        Ok(Self {
            storage,
            host: HostRef::Writable(host),
        })
    }
}

impl MemObject for Buffer<'_> {
    fn storage(&self) -> &Storage {
        &self.storage
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.storage.last_event() {
            if let Err(e) = event.wait() {
                warn!("buffer destroyed after a failed command: {}", e);
            }
        }
        if let HostRef::Writable(host) = &mut self.host {
            match self.storage.read() {
                Ok(data) => host.copy_from_slice(&data),
                Err(e) => error!("buffer write-back skipped: {}", e),
            }
        }
    }
}

/// Shared allocation, addressable from the host and from kernels.
#[derive(Debug)]
pub struct SharedAlloc {
    storage: Arc<Storage>,
}

impl SharedAlloc {
    pub fn new(device: &Device, len: usize) -> Result<Self, DeviceError> {
        Ok(Self {
            storage: Storage::allocate(device, vec![0.0; len])?,
        })
    }

    /// Direct host read of the allocation.
    pub fn host_read(&self) -> Result<RwLockReadGuard<'_, Vec<f32>>, DeviceError> {
        self.storage.read()
    }

    /// Direct host write into the allocation.
    pub fn host_write(&self) -> Result<RwLockWriteGuard<'_, Vec<f32>>, DeviceError> {
        self.storage.write()
    }
}

impl MemObject for SharedAlloc {
    fn storage(&self) -> &Storage {
        &self.storage
    }
}

/// Device-only allocation.
#[derive(Debug)]
pub struct DeviceAlloc {
    storage: Arc<Storage>,
}

impl DeviceAlloc {
    pub fn new(device: &Device, len: usize) -> Result<Self, DeviceError> {
        Ok(Self {
            storage: Storage::allocate(device, vec![0.0; len])?,
        })
    }
}

impl MemObject for DeviceAlloc {
    fn storage(&self) -> &Storage {
        &self.storage
    }
}

/// Allocation kinds that can be created from a length alone.
pub trait Allocation: MemObject + Sized {
    /// human readable residency, used in logs
    const RESIDENCY: &'static str;

    fn allocate(device: &Device, len: usize) -> Result<Self, DeviceError>;
}

impl Allocation for SharedAlloc {
    const RESIDENCY: &'static str = "shared";

    fn allocate(device: &Device, len: usize) -> Result<Self, DeviceError> {
        SharedAlloc::new(device, len)
    }
}

impl Allocation for DeviceAlloc {
    const RESIDENCY: &'static str = "device";

    fn allocate(device: &Device, len: usize) -> Result<Self, DeviceError> {
        DeviceAlloc::new(device, len)
    }
}
