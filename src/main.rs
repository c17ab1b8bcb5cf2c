use clap::Parser;
use clocksyncrs::{
    cli::{validate_device, Args},
    handle_device_list, logging,
    midi::{DefaultMidiEngine, MidiBridge},
    ClockSync, Pattern, SyncConfig, SyncMode, Track,
};
use std::fmt::Display;
use std::sync::Arc;
use std::{thread, time::Duration};

const DEMO_CHANNEL: u8 = 9;
const KICK: u8 = 36;

fn main() {
    let args = Args::parse();
    initialize_logging(args.log_stderr);

    if args.device_list {
        list_available_devices(&handle_device_list());
        return;
    }

    if let Some(device_name) = &args.bind_to_device {
        if let Err(error_msg) = validate_device(device_name, &handle_device_list()) {
            fail(error_msg);
        }
    }

    let config = load_config(&args);
    let sync = ClockSync::new(config).unwrap_or_else(|e| fail(e));

    if args.demo_pattern {
        load_demo_pattern(&sync);
    }

    let _maintenance = sync
        .spawn_maintenance()
        .unwrap_or_else(|e| fail(format!("Could not start maintenance thread: {}", e)));
    let _bridge = connect_midi(args.bind_to_device.clone(), &sync);

    // An external master starts us; otherwise we run straight away.
    if sync.sync_mode() != SyncMode::External {
        sync.start();
    }

    run_application_loop(&sync);
}

fn initialize_logging(to_stderr: bool) {
    let result = if to_stderr {
        logging::init_stderr_logger()
    } else {
        logging::init_logger()
    };
    if let Err(e) = result {
        eprintln!("Logger initialization failed: {}", e);
    }
    log::info!("Application starting");
}

fn fail(message: impl Display) -> ! {
    log::error!("{}", message);
    eprintln!("{}", message);
    std::process::exit(1);
}

fn list_available_devices(devices: &[String]) {
    println!("Available MIDI devices:");
    for device in devices {
        println!("  - {}", device);
    }
}

fn load_config(args: &Args) -> SyncConfig {
    let mut config = SyncConfig::load(args.config.as_deref())
        .unwrap_or_else(|e| fail(format!("Invalid settings: {}", e)));
    args.apply_to(&mut config);
    config
        .validate()
        .unwrap_or_else(|e| fail(format!("Invalid settings: {}", e)))
}

/// Kick on every beat of a one-bar, 16-step pattern.
fn load_demo_pattern(sync: &ClockSync) {
    let step_ticks = sync.ticks_per_quarter() / 4;
    let pattern = Pattern::from_steps(16, step_ticks).and_then(|mut pattern| {
        for step in (0..16).step_by(4) {
            pattern.add_trigger(step, KICK, 100)?;
        }
        Ok(pattern)
    });

    match pattern {
        Ok(pattern) => {
            let id = sync.add_track(
                Track::new("demo kick")
                    .with_channel(DEMO_CHANNEL)
                    .with_pattern(pattern),
            );
            log::info!("Loaded demo pattern on track {}", id);
        }
        Err(e) => log::error!("Could not build demo pattern: {}", e),
    }
}

fn connect_midi(device_name: Option<String>, sync: &ClockSync) -> MidiBridge {
    let engine = DefaultMidiEngine::new(device_name.clone()).unwrap_or_else(|e| {
        fail(format!("Error connecting to MIDI device: {}", e))
    });
    if let Some(name) = device_name {
        log::info!("Successfully connected to MIDI device: {}", name);
        println!("Successfully connected to MIDI device: {}", name);
    }
    MidiBridge::spawn(Arc::new(engine), sync.clone())
        .unwrap_or_else(|e| fail(format!("Could not start MIDI threads: {}", e)))
}

fn run_application_loop(sync: &ClockSync) {
    log::info!("Application running. Press Ctrl+C to exit...");
    println!("\nPress Ctrl+C to exit...");
    loop {
        thread::sleep(Duration::from_secs(1));
        let info = sync.get_timing_info();
        log::debug!(
            "Bar {} beat {} | {:.2} BPM | {} | synced: {}",
            info.bar,
            info.beat_in_bar,
            info.bpm,
            info.transport_state,
            info.is_synced
        );
    }
}
