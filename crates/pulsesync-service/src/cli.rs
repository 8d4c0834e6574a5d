//! Command-line options for `pulsesyncd`.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{DemoConfig, ServiceConfig};

#[derive(Debug, Parser)]
#[command(name = "pulsesyncd")]
#[command(about = "Latency-compensated trigger-to-light scheduler daemon")]
#[command(version)]
pub struct Cli {
    /// Configuration file (.json, .yaml or .yml)
    #[arg(short, long, env = "PULSESYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bulb network address
    #[arg(long)]
    pub bulb: Option<String>,

    /// Target end-to-end latency in milliseconds
    #[arg(long)]
    pub target_latency_ms: Option<u64>,

    /// Pulse length for labels without their own, in milliseconds
    #[arg(long)]
    pub pulse_ms: Option<u64>,

    /// Maximum number of pending events
    #[arg(long)]
    pub max_queue_size: Option<usize>,

    /// Play the demo drum pattern at this tempo
    #[arg(long)]
    pub demo_bpm: Option<u32>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> String {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        format!("pulsesync_service={level},pulsesync_scheduler={level},pulsesyncd={level}")
    }

    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_to(&self, config: &mut ServiceConfig) {
        if let Some(bulb) = &self.bulb {
            config.bulb_address = bulb.clone();
        }
        if let Some(target) = self.target_latency_ms {
            config.scheduler.target_latency_ms = target;
        }
        if let Some(pulse) = self.pulse_ms {
            config.pulse_duration_default_ms = pulse;
        }
        if let Some(size) = self.max_queue_size {
            config.scheduler.max_queue_size = size;
        }
        if let Some(bpm) = self.demo_bpm {
            let demo = config.demo.get_or_insert_with(DemoConfig::default);
            demo.bpm = bpm;
        }
    }
}
