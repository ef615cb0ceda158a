//! Midpoint-rule integral of sin(x)·cos(y) over the unit square, reduced per
//! work-group on the device and summed on the host.
use crate::accelerator::{Buffer, DeviceError, Queue};
use log::{debug, info};
use std::fmt;

/// work-group edge; groups are GROUP_SIZE × GROUP_SIZE work-items
pub const GROUP_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct IntegralReport {
    pub steps: usize,
    pub device: String,
    /// None when the queue does not record profiling information
    pub kernel_ms: Option<f64>,
    pub expected: f32,
    pub computed: f32,
}

impl IntegralReport {
    pub fn difference(&self) -> f32 {
        (self.computed - self.expected).abs()
    }
}

impl fmt::Display for IntegralReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Number of rectangles: {} x {}", self.steps, self.steps)?;
        writeln!(f, "Target device: {}", self.device)?;
        match self.kernel_ms {
            Some(ms) => writeln!(f, "Kernel time: {} ms", ms)?,
            None => writeln!(f, "Kernel time: n/a")?,
        }
        writeln!(f, "Expected value: {}", self.expected)?;
        writeln!(f, "Computed value: {}", self.computed)?;
        write!(f, "Difference: {}", self.difference())
    }
}

/// ∫∫ sin(x)cos(y) dx dy over [0,1]² = 2 sin²(1/2) sin(1)
pub fn expected_value() -> f32 {
    2.0 * 0.5f32.sin().powi(2) * 1.0f32.sin()
}

/// `steps` rectangles per dimension; must be a positive multiple of [`GROUP_SIZE`].
pub fn integrate(steps: usize, queue: &Queue) -> Result<IntegralReport, DeviceError> {
    if steps == 0 {
        return Err(DeviceError::InvalidRange("steps must be positive".to_string()));
    }
    let dx = 1.0 / steps as f32;
    let dy = 1.0 / steps as f32;
    let groups = steps / GROUP_SIZE + 1;
    let mut result = vec![0.0f32; groups * groups];
    debug!("{} work-groups per dimension", steps / GROUP_SIZE);

    let event = {
        let buffer = Buffer::from_mut(queue.device(), &mut result)?;
        let event = queue.parallel_for_groups(
            [steps, steps],
            [GROUP_SIZE, GROUP_SIZE],
            &buffer,
            |[i, j]| {
                let x = dx * (i as f32 + 0.5);
                let y = dy * (j as f32 + 0.5);
                x.sin() * y.cos()
            },
        )?;
        queue.wait()?;
        event
    };
    let computed = result.iter().sum::<f32>() * dx * dy;
    let kernel_ms = if queue.properties().enable_profiling {
        Some(event.duration_ms()?)
    } else {
        None
    };

    let report = IntegralReport {
        steps,
        device: queue.device().name().to_string(),
        kernel_ms,
        expected: expected_value(),
        computed,
    };
    info!("integral on '{}': difference {:e}", report.device, report.difference());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::{Device, DeviceSpec, DeviceType, QueueProperties};
    use approx::assert_relative_eq;

    fn queue(profiling: bool) -> Queue {
        let device = Device::new(DeviceSpec {
            name: "integral test device".to_string(),
            device_type: DeviceType::Gpu,
            compute_units: 4,
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
    fn test_expected_value() {
        assert_relative_eq!(expected_value(), 0.386_822_4, epsilon = 1e-6);
    }

    #[test]
    fn test_integral_matches_closed_form() {
        let q = queue(true);
        let report = integrate(256, &q).unwrap();
        assert!(report.difference() < 1e-3, "{}", report);
        assert!(report.kernel_ms.unwrap() >= 0.0);
        assert_eq!(report.device, "integral test device");
        assert_eq!(q.kernel_launches(), 1);
        assert_eq!(q.device().allocated_bytes(), 0);
    }

    #[test]
    fn test_kernel_time_missing_without_profiling() {
        let report = integrate(64, &queue(false)).unwrap();
        assert!(report.kernel_ms.is_none());
        assert!(report.to_string().contains("Kernel time: n/a"));
    }

    #[test]
    fn test_steps_must_fill_work_groups() {
        let q = queue(true);
        assert!(matches!(integrate(100, &q), Err(DeviceError::InvalidRange(_))));
        assert!(matches!(integrate(0, &q), Err(DeviceError::InvalidRange(_))));
        assert_eq!(q.device().allocated_bytes(), 0);
    }

    #[test]
    fn test_work_group_over_device_limit() {
        let device = Device::new(DeviceSpec {
            name: "narrow device".to_string(),
            device_type: DeviceType::Gpu,
            compute_units: 1,
            max_work_group_size: 64,
            global_mem_bytes: 1 << 20,
        })
        .unwrap();
        let q = Queue::new(&device, QueueProperties::default());
        assert!(matches!(integrate(32, &q), Err(DeviceError::InvalidRange(_))));
    }

    #[test]
    fn test_device_failure_is_reported() {
        let q = queue(true);
        q.fail_after(1);
        assert!(matches!(integrate(32, &q), Err(DeviceError::DeviceLost(_))));
    }
}
