use crate::clock::{StartQuantize, SyncMode};
use crate::config::SyncConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// List available MIDI devices
    #[arg(long)]
    pub device_list: bool,

    /// Bind to a specific MIDI device
    #[arg(long)]
    pub bind_to_device: Option<String>,

    /// Settings file (any format the config crate understands)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Initial tempo
    #[arg(long)]
    pub bpm: Option<f64>,

    /// Clock source: internal, external or auto
    #[arg(long)]
    pub mode: Option<SyncMode>,

    /// Align the first internal pulse to: none, beat or bar
    #[arg(long)]
    pub start_quantize: Option<StartQuantize>,

    /// Load a four-on-the-floor pattern on channel 10
    #[arg(long)]
    pub demo_pattern: bool,

    /// Log to stderr (RUST_LOG) instead of the log file
    #[arg(long)]
    pub log_stderr: bool,
}

impl Args {
    /// Command line flags win over file and environment settings.
    pub fn apply_to(&self, config: &mut SyncConfig) {
        if let Some(bpm) = self.bpm {
            config.bpm = bpm;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(quantize) = self.start_quantize {
            config.start_quantize = quantize;
        }
    }
}

pub fn validate_device(device_name: &str, devices: &[String]) -> Result<(), String> {
    if !devices.iter().any(|d| d.contains(device_name)) {
        let mut error_msg = format!(
            "Error: Device '{}' not found in available devices:\n",
            device_name
        );
        for device in devices {
            error_msg.push_str(&format!("  - {}\n", device));
        }
        return Err(error_msg);
    }
    Ok(())
}
