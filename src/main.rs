#![allow(non_snake_case)]
use RustedJacobi::Examples::hello::hello;
use RustedJacobi::Examples::integral::integrate;
use RustedJacobi::Examples::jacobi_bench::jacobi_benchmark;
use RustedJacobi::Utils::config::BenchConfig;
use RustedJacobi::Utils::logger::{default_log_file_name, init_logging, parse_level};
use RustedJacobi::Utils::sys_info::system_info_tables;
use RustedJacobi::accelerator::{Platform, create_device_queue_by_type};
use clap::{Parser, Subcommand};
use log::error;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "rusted-jacobi",
    about = "Jacobi solver benchmark on an accelerator queue",
    version
)]
struct Cli {
    /// TOML file with [jacobi], [integral] and [logging] tables
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// debug, info, warn, error or off
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// also write the log into this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// also write the log into a timestamped file in the current directory
    #[arg(long, global = true, conflicts_with = "log_file")]
    log_to_file: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List platforms and devices and run a tiny kernel on each of them
    Hello,
    /// Integrate sin(x)cos(y) over the unit square
    Integral {
        /// rectangles per dimension, a multiple of 16
        steps: Option<usize>,
        /// cpu, gpu or anything else for the default device
        device: Option<String>,
    },
    /// Solve a random system with every memory strategy and compare them
    Jacobi {
        /// number of rows of the system
        rows: Option<usize>,
        /// target relative change between iterates
        accuracy: Option<f32>,
        /// iteration cap
        iterations: Option<usize>,
        /// cpu, gpu or anything else for the default device
        device: Option<String>,
        /// print host and device tables before the results
        #[arg(long)]
        sys_info: bool,
    },
    /// Show host information and the available devices
    Info,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::from_file(path)?,
        None => BenchConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(file) = cli.log_file {
        config.logging.file = Some(file);
    } else if cli.log_to_file {
        config.logging.file = Some(default_log_file_name());
    }
    match &cli.command {
        Commands::Integral { steps, device } => {
            if let Some(steps) = steps {
                config.integral.steps = *steps;
            }
            if let Some(device) = device {
                config.integral.device = device.clone();
            }
        }
        Commands::Jacobi {
            rows,
            accuracy,
            iterations,
            device,
            ..
        } => {
            let j = &mut config.jacobi;
            if let Some(rows) = rows {
                j.rows = *rows;
            }
            if let Some(accuracy) = accuracy {
                j.accuracy = *accuracy;
            }
            if let Some(iterations) = iterations {
                j.iterations = *iterations;
            }
            if let Some(device) = device {
                j.device = device.clone();
            }
        }
        Commands::Hello | Commands::Info => {}
    }
    config.validate()?;
    init_logging(
        parse_level(&config.logging.level)?,
        config.logging.file.as_deref(),
    )?;

    match cli.command {
        Commands::Hello => hello()?,
        Commands::Integral { .. } => {
            let queue = create_device_queue_by_type(&config.integral.device)?;
            println!("{}", integrate(config.integral.steps, &queue)?);
        }
        Commands::Jacobi { sys_info, .. } => {
            if sys_info {
                println!("{}\n", system_info_tables(&Platform::get_platforms()?));
            }
            println!("{}", jacobi_benchmark(&config.jacobi)?);
        }
        Commands::Info => println!("{}", system_info_tables(&Platform::get_platforms()?)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_positional_jacobi_arguments() {
        let cli = Cli::try_parse_from(["rusted-jacobi", "jacobi", "512", "1e-5", "300", "gpu"]).unwrap();
        match cli.command {
            Commands::Jacobi {
                rows,
                accuracy,
                iterations,
                device,
                sys_info,
            } => {
                assert!(!sys_info);
                assert_eq!(rows, Some(512));
                assert_eq!(accuracy, Some(1e-5));
                assert_eq!(iterations, Some(300));
                assert_eq!(device.as_deref(), Some("gpu"));
            }
            _ => panic!("expected the jacobi command"),
        }
    }

    #[test]
    fn test_cli_global_options_and_defaults() {
        let cli = Cli::try_parse_from(["rusted-jacobi", "integral", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Commands::Integral {
                steps: None,
                device: None
            }
        ));
        assert!(Cli::try_parse_from(["rusted-jacobi", "jacobi", "many"]).is_err());
        let cli = Cli::try_parse_from(["rusted-jacobi", "jacobi", "--sys-info"]).unwrap();
        assert!(matches!(cli.command, Commands::Jacobi { sys_info: true, rows: None, .. }));
        assert!(
            Cli::try_parse_from(["rusted-jacobi", "info", "--log-file", "a.log", "--log-to-file"])
                .is_err()
        );
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        let cli = Cli::try_parse_from(["rusted-jacobi", "jacobi", "0"]).unwrap();
        assert!(run(cli).is_err());
        let cli = Cli::try_parse_from(["rusted-jacobi", "hello", "--log-level", "loud"]).unwrap();
        assert!(run(cli).is_err());
    }
}
