//! In-order command queue of the emulated accelerator.
//!
//! Every command (kernel launch or copy) is executed on the device worker pool
//! before the submitting call returns, so the queue is strictly in order. What the
//! caller gets back is an [`Event`] carrying the completion status of the command
//! and, when profiling is enabled, its start/end timestamps. Execution failures are
//! asynchronous: submission succeeds, the failure is reported by [`Event::wait`]
//! and by the next [`Queue::wait`].
//!
//! Kernels declare what they touch: a list of memory objects they read and a
//! single memory object they write. A write target that also appears among the
//! reads is rejected, so work-items can never observe a half-updated input.
use crate::accelerator::device::Device;
use crate::accelerator::error::DeviceError;
use crate::accelerator::memory::{MemObject, Storage};
use log::{debug, error};
use rayon::prelude::*;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CommandKind {
    #[strum(serialize = "kernel")]
    Kernel,
    #[strum(serialize = "copy host->device")]
    CopyToDevice,
    #[strum(serialize = "copy device->host")]
    CopyToHost,
    #[strum(serialize = "copy device->device")]
    CopyOnDevice,
}

#[derive(Debug)]
struct EventInner {
    kind: CommandKind,
    status: Result<(), DeviceError>,
    profiling: bool,
    start_ns: u64,
    end_ns: u64,
}

/// Completion handle of a submitted command.
#[derive(Debug, Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    /// Blocks until the command is complete and reports how it ended.
    pub fn wait(&self) -> Result<(), DeviceError> {
        self.inner.status.clone()
    }

    pub fn kind(&self) -> CommandKind {
        self.inner.kind
    }

    /// nanoseconds since queue creation at which the command started
    pub fn command_start(&self) -> Result<u64, DeviceError> {
        self.profiled(self.inner.start_ns)
    }

    /// nanoseconds since queue creation at which the command ended
    pub fn command_end(&self) -> Result<u64, DeviceError> {
        self.profiled(self.inner.end_ns)
    }

    pub fn duration_ms(&self) -> Result<f64, DeviceError> {
        Ok((self.command_end()? - self.command_start()?) as f64 / 1e6)
    }

    fn profiled(&self, value: u64) -> Result<u64, DeviceError> {
        if self.inner.profiling {
            Ok(value)
        } else {
            Err(DeviceError::ProfilingDisabled)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueProperties {
    pub enable_profiling: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    submissions: u64,
    kernel_launches: u64,
    fail_at: Option<u64>,
    pending_error: Option<DeviceError>,
}

#[derive(Debug)]
pub struct Queue {
    device: Device,
    properties: QueueProperties,
    epoch: Instant,
    state: Mutex<QueueState>,
}

impl Queue {
    pub fn new(device: &Device, properties: QueueProperties) -> Self {
        Self {
            device: device.clone(),
            properties,
            epoch: Instant::now(),
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn properties(&self) -> QueueProperties {
        self.properties
    }

    /// number of commands accepted so far
    pub fn submissions(&self) -> u64 {
        self.lock_state().map_or(0, |s| s.submissions)
    }

    /// number of kernels launched so far
    pub fn kernel_launches(&self) -> u64 {
        self.lock_state().map_or(0, |s| s.kernel_launches)
    }

    /// Makes the `n`-th command submitted from now on fail during execution, as a
    /// device would when it is lost. The failure happens once; later commands run
    /// normally. `n = 0` clears a pending request.
    pub fn fail_after(&self, n: u64) {
        if let Ok(mut state) = self.lock_state() {
            let due = state.submissions + n;
            state.fail_at = (n > 0).then_some(due);
        }
    }

    /// Blocks until all submitted commands are complete. Reports (and clears) the
    /// first execution failure since the previous wait.
    pub fn wait(&self) -> Result<(), DeviceError> {
        let mut state = self.lock_state()?;
        match state.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Launches `kernel` over `0..range`. Work-item `i` receives its index and the
    /// contents of `reads` (in the given order) and produces element `i` of `write`.
    pub fn parallel_for<K>(
        &self,
        range: usize,
        reads: &[&dyn MemObject],
        write: &dyn MemObject,
        kernel: K,
    ) -> Result<Event, DeviceError>
    where
        K: Fn(usize, &[&[f32]]) -> f32 + Send + Sync,
    {
        let target = write.storage();
        self.check_device(target)?;
        if range > target.len() {
            return Err(DeviceError::InvalidRange(format!(
                "range {} exceeds the {} elements of the write target",
                range,
                target.len()
            )));
        }
        for read in reads {
            self.check_device(read.storage())?;
            if read.storage().id() == target.id() {
                return Err(DeviceError::AliasedAccess);
            }
        }
        let event = self.run(CommandKind::Kernel, || {
            let guards = reads
                .iter()
                .map(|r| r.storage().read())
                .collect::<Result<Vec<_>, _>>()?;
            let inputs: Vec<&[f32]> = guards.iter().map(|g| g.as_slice()).collect();
            let mut output = target.write()?;
            let out = &mut output[..range];
            let inputs: &[&[f32]] = &inputs;
            let kernel = &kernel;
            self.device.install(|| {
                out.par_iter_mut()
                    .enumerate()
                    .for_each(|(i, slot)| *slot = kernel(i, inputs));
            });
            Ok(())
        })?;
        target.record(&event);
        for read in reads {
            read.storage().record(&event);
        }
        Ok(event)
    }

    /// Launches `kernel` over a 2-D range split into work-groups of shape `local`.
    /// Each group sums the values of its work-items and writes the sum into
    /// `write[gx * groups_y + gy]`. Both dimensions of `global` must be multiples
    /// of `local` and a group may not exceed the work-group limit of the device.
    pub fn parallel_for_groups<K>(
        &self,
        global: [usize; 2],
        local: [usize; 2],
        write: &dyn MemObject,
        kernel: K,
    ) -> Result<Event, DeviceError>
    where
        K: Fn([usize; 2]) -> f32 + Send + Sync,
    {
        let target = write.storage();
        self.check_device(target)?;
        if local[0] == 0 || local[1] == 0 || global[0] % local[0] != 0 || global[1] % local[1] != 0
        {
            return Err(DeviceError::InvalidRange(format!(
                "global range {:?} is not divisible by work-group {:?}",
                global, local
            )));
        }
        if local[0] * local[1] > self.device.max_work_group_size() {
            return Err(DeviceError::InvalidRange(format!(
                "work-group {:?} exceeds the device limit of {} work-items",
                local,
                self.device.max_work_group_size()
            )));
        }
        let groups = [global[0] / local[0], global[1] / local[1]];
        if groups[0] * groups[1] > target.len() {
            return Err(DeviceError::InvalidRange(format!(
                "{} work-groups do not fit into {} output elements",
                groups[0] * groups[1],
                target.len()
            )));
        }
        let event = self.run(CommandKind::Kernel, || {
            let mut output = target.write()?;
            let out = &mut output[..groups[0] * groups[1]];
            let kernel = &kernel;
            self.device.install(|| {
                out.par_iter_mut().enumerate().for_each(|(g, slot)| {
                    let (gx, gy) = (g / groups[1], g % groups[1]);
                    let mut sum = 0.0f32;
                    for lx in 0..local[0] {
                        for ly in 0..local[1] {
                            sum += kernel([gx * local[0] + lx, gy * local[1] + ly]);
                        }
                    }
                    *slot = sum;
                });
            });
            Ok(())
        })?;
        target.record(&event);
        Ok(event)
    }

    /// Launches `kernel` over `0..range` and gathers the values produced by the
    /// work-items in index order, the way a device-side output stream would.
    pub fn parallel_map<T, K>(&self, range: usize, kernel: K) -> Result<(Vec<T>, Event), DeviceError>
    where
        T: Send,
        K: Fn(usize) -> T + Send + Sync,
    {
        let mut produced = Vec::new();
        let event = self.run(CommandKind::Kernel, || {
            produced = self
                .device
                .install(|| (0..range).into_par_iter().map(&kernel).collect());
            Ok(())
        })?;
        Ok((produced, event))
    }

    /// Copies host data into a memory object of the same length.
    pub fn memcpy_to_device(&self, dst: &dyn MemObject, src: &[f32]) -> Result<Event, DeviceError> {
        let target = dst.storage();
        self.check_device(target)?;
        check_len(target.len(), src.len())?;
        let event = self.run(CommandKind::CopyToDevice, || {
            target.write()?.copy_from_slice(src);
            Ok(())
        })?;
        target.record(&event);
        Ok(event)
    }

    /// Copies a memory object into host memory of the same length.
    pub fn memcpy_to_host(&self, dst: &mut [f32], src: &dyn MemObject) -> Result<Event, DeviceError> {
        let source = src.storage();
        self.check_device(source)?;
        check_len(source.len(), dst.len())?;
        let event = self.run(CommandKind::CopyToHost, || {
            dst.copy_from_slice(&source.read()?);
            Ok(())
        })?;
        source.record(&event);
        Ok(event)
    }

    /// Copies one memory object into another of the same length.
    pub fn memcpy(&self, dst: &dyn MemObject, src: &dyn MemObject) -> Result<Event, DeviceError> {
        let (target, source) = (dst.storage(), src.storage());
        self.check_device(target)?;
        self.check_device(source)?;
        check_len(target.len(), source.len())?;
        if target.id() == source.id() {
            return Err(DeviceError::AliasedAccess);
        }
        let event = self.run(CommandKind::CopyOnDevice, || {
            target.write()?.copy_from_slice(&source.read()?);
            Ok(())
        })?;
        target.record(&event);
        source.record(&event);
        Ok(event)
    }

    /// Accepts a command and executes it, unless an injected failure is due.
    /// Errors returned by `op` itself are submission errors and are returned directly.
    fn run<F>(&self, kind: CommandKind, op: F) -> Result<Event, DeviceError>
    where
        F: FnOnce() -> Result<(), DeviceError>,
    {
        let (number, fault) = {
            let mut state = self.lock_state()?;
            state.submissions += 1;
            if kind == CommandKind::Kernel {
                state.kernel_launches += 1;
            }
            let fault = state.fail_at == Some(state.submissions);
            if fault {
                state.fail_at = None;
            }
            (state.submissions, fault)
        };
        let start_ns = self.now_ns();
        let status = if fault {
            let err = DeviceError::DeviceLost(format!(
                "{} #{} failed on '{}'",
                kind,
                number,
                self.device.name()
            ));
            error!("{}", err);
            let mut state = self.lock_state()?;
            if state.pending_error.is_none() {
                state.pending_error = Some(err.clone());
            }
            Err(err)
        } else {
            op()?;
            Ok(())
        };
        let end_ns = self.now_ns();
        debug!(
            "{} #{} on device #{} took {} ns",
            kind,
            number,
            self.device.id(),
            end_ns - start_ns
        );
        Ok(Event {
            inner: Arc::new(EventInner {
                kind,
                status,
                profiling: self.properties.enable_profiling,
                start_ns,
                end_ns,
            }),
        })
    }

    fn check_device(&self, storage: &Storage) -> Result<(), DeviceError> {
        if storage.device().is_same(&self.device) {
            Ok(())
        } else {
            Err(DeviceError::WrongDevice {
                queue: self.device.id(),
                memory: storage.device().id(),
            })
        }
    }

    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, QueueState>, DeviceError> {
        self.state.lock().map_err(|_| DeviceError::PoisonedStorage)
    }
}

fn check_len(expected: usize, found: usize) -> Result<(), DeviceError> {
    if expected == found {
        Ok(())
    } else {
        Err(DeviceError::SizeMismatch { expected, found })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::device::{DeviceSpec, DeviceType};
    use crate::accelerator::memory::{Buffer, DeviceAlloc, SharedAlloc};

    fn queue(profiling: bool) -> Queue {
        let device = Device::new(DeviceSpec {
            name: "queue test device".to_string(),
            device_type: DeviceType::Gpu,
            compute_units: 3,
            max_work_group_size: 256,
            global_mem_bytes: 1 << 20,
        })
        .unwrap();
        Queue::new(
            &device,
            QueueProperties {
                enable_profiling: profiling,
            },
        )
    }

    #[test]
    fn test_parallel_for_writes_every_slot() {
        let q = queue(false);
        let input = SharedAlloc::new(q.device(), 5).unwrap();
        let output = DeviceAlloc::new(q.device(), 5).unwrap();
        q.memcpy_to_device(&input, &[1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap()
            .wait()
            .unwrap();
        q.parallel_for(5, &[&input], &output, |i, r| r[0][i] * 2.0 + i as f32)
            .unwrap()
            .wait()
            .unwrap();
        let mut host = vec![0.0; 5];
        q.memcpy_to_host(&mut host, &output).unwrap().wait().unwrap();
        assert_eq!(host, vec![2.0, 5.0, 8.0, 11.0, 14.0]);
        assert_eq!(q.kernel_launches(), 1);
        assert_eq!(q.submissions(), 3);
    }

    #[test]
    fn test_aliased_read_and_write_is_rejected() {
        let q = queue(false);
        let x = DeviceAlloc::new(q.device(), 3).unwrap();
        let err = q.parallel_for(3, &[&x], &x, |i, r| r[0][i]).unwrap_err();
        assert_eq!(err, DeviceError::AliasedAccess);
        assert_eq!(q.memcpy(&x, &x).unwrap_err(), DeviceError::AliasedAccess);
        assert_eq!(q.submissions(), 0);
    }

    #[test]
    fn test_size_mismatch_and_range_checks() {
        let q = queue(false);
        let x = DeviceAlloc::new(q.device(), 3).unwrap();
        let y = DeviceAlloc::new(q.device(), 4).unwrap();
        assert_eq!(
            q.memcpy(&x, &y).unwrap_err(),
            DeviceError::SizeMismatch {
                expected: 3,
                found: 4
            }
        );
        assert!(matches!(
            q.parallel_for(4, &[&y], &x, |_, _| 0.0),
            Err(DeviceError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_memory_from_another_device_is_rejected() {
        let q = queue(false);
        let other = queue(false);
        let foreign = DeviceAlloc::new(other.device(), 2).unwrap();
        assert!(matches!(
            q.memcpy_to_device(&foreign, &[1.0, 2.0]),
            Err(DeviceError::WrongDevice { .. })
        ));
    }

    #[test]
    fn test_injected_failure_surfaces_on_wait_once() {
        let q = queue(false);
        let x = DeviceAlloc::new(q.device(), 2).unwrap();
        q.fail_after(2);
        assert!(q.memcpy_to_device(&x, &[1.0, 1.0]).unwrap().wait().is_ok());
        let event = q.memcpy_to_device(&x, &[7.0, 7.0]).unwrap();
        assert!(matches!(event.wait(), Err(DeviceError::DeviceLost(_))));
        assert!(matches!(q.wait(), Err(DeviceError::DeviceLost(_))));
        // the failed copy had no effect and the queue keeps working
        let mut host = vec![0.0; 2];
        q.memcpy_to_host(&mut host, &x).unwrap().wait().unwrap();
        assert_eq!(host, vec![1.0, 1.0]);
        assert!(q.wait().is_ok());
    }

    #[test]
    fn test_profiling_timestamps() {
        let q = queue(true);
        let x = DeviceAlloc::new(q.device(), 1000).unwrap();
        let event = q.parallel_for(1000, &[], &x, |i, _| (i as f32).sqrt()).unwrap();
        let start = event.command_start().unwrap();
        let end = event.command_end().unwrap();
        assert!(end >= start);
        assert!(event.duration_ms().unwrap() >= 0.0);
        assert_eq!(event.kind(), CommandKind::Kernel);

        let silent = queue(false);
        let y = DeviceAlloc::new(silent.device(), 1).unwrap();
        let event = silent.memcpy_to_device(&y, &[1.0]).unwrap();
        assert_eq!(event.command_start().unwrap_err(), DeviceError::ProfilingDisabled);
    }

    #[test]
    fn test_group_reduction() {
        let q = queue(false);
        let out = DeviceAlloc::new(q.device(), 4).unwrap();
        q.parallel_for_groups([8, 8], [4, 4], &out, |_| 1.0)
            .unwrap()
            .wait()
            .unwrap();
        let mut host = vec![0.0; 4];
        q.memcpy_to_host(&mut host, &out).unwrap();
        assert_eq!(host, vec![16.0; 4]);
        assert!(matches!(
            q.parallel_for_groups([10, 10], [4, 4], &out, |_| 1.0),
            Err(DeviceError::InvalidRange(_))
        ));
        assert!(matches!(
            q.parallel_for_groups([32, 32], [32, 32], &out, |_| 1.0),
            Err(DeviceError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_parallel_map_keeps_order() {
        let q = queue(false);
        let (lines, _) = q.parallel_map(4, |i| format!("[{}]", i)).unwrap();
        assert_eq!(lines, vec!["[0]", "[1]", "[2]", "[3]"]);
    }

    #[test]
    fn test_buffer_drop_after_kernel_writes_back() {
        let q = queue(false);
        let src = vec![1.0f32, 2.0, 3.0];
        let mut dst = vec![0.0f32; 3];
        {
            let a = Buffer::from_slice(q.device(), &src).unwrap();
            let b = Buffer::from_mut(q.device(), &mut dst).unwrap();
            q.parallel_for(3, &[&a], &b, |i, r| -r[0][i]).unwrap();
        }
        assert_eq!(dst, vec![-1.0, -2.0, -3.0]);
        assert_eq!(q.device().allocated_bytes(), 0);
    }
}
