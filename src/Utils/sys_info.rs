/*
Pretty printing of the machine the benchmark runs on: host facts from sys-info and
the devices the accelerator runtime exposes.
*/
use crate::accelerator::Platform;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Debug, PartialEq, Tabled)]
pub struct SystemInfo {
    key: &'static str,
    value: String,
}

#[derive(Debug, PartialEq, Tabled)]
pub struct DeviceInfo {
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "Compute units")]
    compute_units: usize,
    #[tabled(rename = "Max work-group")]
    max_work_group_size: usize,
    #[tabled(rename = "Global memory (MB)")]
    global_mem_mb: usize,
}

fn or_unknown<T: ToString, E>(value: Result<T, E>) -> String {
    value.map_or_else(|_| "unknown".to_string(), |v| v.to_string())
}

pub fn host_info() -> Vec<SystemInfo> {
    let mem_info = sys_info::mem_info();
    let loadavg = sys_info::loadavg();
    vec![
        SystemInfo { key: "CPU Cores", value: or_unknown(sys_info::cpu_num()) },
        SystemInfo { key: "CPU Speed (MHz)", value: or_unknown(sys_info::cpu_speed()) },
        SystemInfo { key: "Load Average (1 min)", value: or_unknown(loadavg.as_ref().map(|l| l.one)) },
        SystemInfo { key: "Memory Total (KB)", value: or_unknown(mem_info.as_ref().map(|m| m.total)) },
        SystemInfo { key: "Memory Free (KB)", value: or_unknown(mem_info.as_ref().map(|m| m.free)) },
        SystemInfo { key: "OS Type", value: or_unknown(sys_info::os_type()) },
        SystemInfo { key: "OS Release", value: or_unknown(sys_info::os_release()) },
    ]
}

pub fn device_info(platforms: &[Platform]) -> Vec<DeviceInfo> {
    platforms
        .iter()
        .flat_map(|p| {
            p.devices().iter().map(move |d| DeviceInfo {
                platform: p.name().to_string(),
                device: d.name().to_string(),
                device_type: d.device_type().to_string(),
                compute_units: d.compute_units(),
                max_work_group_size: d.max_work_group_size(),
                global_mem_mb: d.global_mem_bytes() >> 20,
            })
        })
        .collect()
}

/// Host table followed by the device table.
pub fn system_info_tables(platforms: &[Platform]) -> String {
    let mut host = Table::new(host_info());
    host.with(Style::modern_rounded());
    let mut devices = Table::new(device_info(platforms));
    devices.with(Style::modern_rounded());
    format!("System Information\n{}\n\nDevices\n{}", host, devices)
}
