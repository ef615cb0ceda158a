//! Device enumeration and a tiny kernel on every device found.
use crate::accelerator::{DeviceError, Platform, Queue, QueueProperties};
use log::{info, warn};

/// work-items launched on every device
pub const HELLO_WORK_ITEMS: usize = 4;

/// "Platform #p: name" followed by one "-- Device #d: name" line per device.
pub fn platform_listing(platforms: &[Platform]) -> Vec<String> {
    let mut lines = Vec::new();
    for (p, platform) in platforms.iter().enumerate() {
        lines.push(format!("Platform #{}: {}", p, platform.name()));
        for (d, device) in platform.devices().iter().enumerate() {
            lines.push(format!("-- Device #{}: {}", d, device.name()));
        }
    }
    lines
}

/// One line per work-item, in work-item order.
pub fn hello_on_queue(queue: &Queue, platform: usize, device: usize) -> Result<Vec<String>, DeviceError> {
    let (lines, event) = queue.parallel_map(HELLO_WORK_ITEMS, |i| {
        format!("[{}] Hello from platform {} and device {}", i, platform, device)
    })?;
    queue.wait()?;
    event.wait()?;
    Ok(lines)
}

/// Full output of the hello program. A device that fails contributes its error
/// message instead of the greetings; the remaining devices still run.
pub fn hello_lines(platforms: &[Platform]) -> Vec<String> {
    let mut lines = platform_listing(platforms);
    lines.push(String::new());
    for (p, platform) in platforms.iter().enumerate() {
        for (d, device) in platform.devices().iter().enumerate() {
            lines.push(device.name().to_string());
            let queue = Queue::new(device, QueueProperties::default());
            match hello_on_queue(&queue, p, d) {
                Ok(greetings) => lines.extend(greetings),
                Err(e) => {
                    warn!("device '{}' failed: {}", device.name(), e);
                    lines.push(e.to_string());
                }
            }
        }
        lines.push(String::new());
    }
    lines
}

pub fn hello() -> Result<(), DeviceError> {
    let platforms = Platform::get_platforms()?;
    info!("{} platform(s) found", platforms.len());
    for line in hello_lines(&platforms) {
        println!("{}", line);
    }
    Ok(())
}
