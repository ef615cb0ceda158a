//! The Jacobi benchmark: one generated system, solved with every memory strategy
//! on the same queue, followed by the comparison table.
use crate::Utils::config::JacobiSettings;
use crate::Utils::equation_system::generate_equation_system;
use crate::Utils::report::{report_rows, results_table, strategies_agree};
use crate::accelerator::{Queue, create_device_queue_by_type};
use crate::jacobi::{CompResult, JacobiSolver, LinearSystem, MemoryStrategy, SolverConfig};
use log::{info, warn};
use std::error::Error;
use strum::IntoEnumIterator;

pub fn run_all_strategies(
    system: &LinearSystem,
    config: SolverConfig,
    queue: &Queue,
) -> Vec<(MemoryStrategy, CompResult)> {
    let solver = JacobiSolver::new(system, config, queue);
    MemoryStrategy::iter()
        .map(|strategy| (strategy, solver.solve(strategy)))
        .collect()
}

/// Header, comparison table and the agreement verdict for one benchmark run.
pub fn benchmark_report(
    system: &LinearSystem,
    queue: &Queue,
    results: &[(MemoryStrategy, CompResult)],
) -> String {
    let mut out = format!(
        "Rows: {}\nTarget device: {}\n",
        system.rows(),
        queue.device().name()
    );
    out.push_str(&results_table(&report_rows(system, results)));
    let plain: Vec<CompResult> = results.iter().map(|(_, r)| r.clone()).collect();
    if strategies_agree(&plain) {
        out.push_str("\nAll completed strategies agree.");
    } else {
        warn!("memory strategies produced different solutions");
        out.push_str("\nWARNING: memory strategies disagree.");
    }
    out
}

pub fn jacobi_benchmark(settings: &JacobiSettings) -> Result<String, Box<dyn Error>> {
    let queue = create_device_queue_by_type(&settings.device)?;
    settings.check_fits(queue.device().global_mem_bytes())?;
    info!(
        "generating a {}x{} system for '{}'",
        settings.rows,
        settings.rows,
        queue.device().name()
    );
    let system = generate_equation_system(settings.rows);
    let config = SolverConfig {
        iterations_limit: settings.iterations,
        accuracy_target: settings.accuracy,
    };
    let results = run_all_strategies(&system, config, &queue);
    Ok(benchmark_report(&system, &queue, &results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Utils::config::ConfigError;
    use crate::Utils::equation_system::generate_equation_system_seeded;
    use crate::accelerator::{Device, DeviceSpec, DeviceType, QueueProperties};

    fn queue(capacity: usize) -> Queue {
        let device = Device::new(DeviceSpec {
            name: "bench test device".to_string(),
            device_type: DeviceType::Gpu,
            compute_units: 4,
            max_work_group_size: 256,
            global_mem_bytes: capacity,
        })
        .unwrap();
        Queue::new(&device, QueueProperties::default())
    }

    const CONFIG: SolverConfig = SolverConfig {
        iterations_limit: 200,
        accuracy_target: 1e-6,
    };

    #[test]
    fn test_run_all_strategies_on_generated_system() {
        let q = queue(1 << 24);
        let system = generate_equation_system_seeded(96, 3);
        let results = run_all_strategies(&system, CONFIG, &q);
        let order: Vec<MemoryStrategy> = results.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            order,
            vec![
                MemoryStrategy::AccessorManaged,
                MemoryStrategy::UnifiedShared,
                MemoryStrategy::DeviceExclusive
            ]
        );
        for (strategy, result) in &results {
            assert!(result.is_complete(), "{}", strategy);
            assert!(result.iter < CONFIG.iterations_limit);
        }
        let report = benchmark_report(&system, &q, &results);
        assert!(report.starts_with("Rows: 96\nTarget device: bench test device\n"));
        assert!(report.contains("Unified-Shared"));
        assert!(report.contains("All completed strategies agree."));
        assert_eq!(q.device().allocated_bytes(), 0);
    }

    #[test]
    fn test_report_survives_failed_strategy() {
        let q = queue(1 << 24);
        let system = generate_equation_system_seeded(16, 5);
        q.fail_after(2);
        let results = run_all_strategies(&system, CONFIG, &q);
        assert!(!results[0].1.is_complete());
        assert!(results[1].1.is_complete());
        assert!(results[2].1.is_complete());
        let report = benchmark_report(&system, &q, &results);
        assert!(report.contains("device lost"));
        assert!(report.contains("All completed strategies agree."));
    }

    #[test]
    fn test_oversized_system_is_rejected_before_generation() {
        let settings = JacobiSettings {
            rows: 1 << 24,
            accuracy: 1e-5,
            iterations: 100,
            device: "cpu".to_string(),
        };
        let err = jacobi_benchmark(&settings).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_jacobi_benchmark_on_host_device() {
        let settings = JacobiSettings {
            rows: 32,
            accuracy: 1e-5,
            iterations: 100,
            device: "cpu".to_string(),
        };
        let report = jacobi_benchmark(&settings).unwrap();
        assert!(report.contains("Accessor-Managed"));
        assert!(report.contains("Device-Exclusive"));
    }
}
