//! Internal pulse generation with start quantization

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info, trace};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Where the first generated pulse lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartQuantize {
    #[default]
    None,
    Beat,
    Bar,
}

impl fmt::Display for StartQuantize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartQuantize::None => write!(f, "none"),
            StartQuantize::Beat => write!(f, "beat"),
            StartQuantize::Bar => write!(f, "bar"),
        }
    }
}

impl FromStr for StartQuantize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(StartQuantize::None),
            "beat" => Ok(StartQuantize::Beat),
            "bar" => Ok(StartQuantize::Bar),
            other => Err(format!("unknown start quantization '{}'", other)),
        }
    }
}

/// First multiple of `period` at or after `now`.
pub fn next_boundary(now: f64, period: f64) -> f64 {
    (now / period).ceil() * period
}

/// Delay from `wall_now` (seconds since the Unix epoch) until the first
/// pulse may fire.
pub fn quantized_start_delay(
    wall_now: f64,
    bpm: f64,
    beats_per_bar: u32,
    quantize: StartQuantize,
) -> Duration {
    let beat = 60.0 / bpm;
    let period = match quantize {
        StartQuantize::None => return Duration::ZERO,
        StartQuantize::Beat => beat,
        StartQuantize::Bar => beat * f64::from(beats_per_bar.max(1)),
    };
    let delay = next_boundary(wall_now, period) - wall_now;
    Duration::from_secs_f64(delay.max(0.0))
}

/// Current wall-clock time in seconds since the Unix epoch.
pub fn wall_clock_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Drives pulses from a dedicated thread until stopped.
pub struct ClockGenerator {
    shutdown: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ClockGenerator {
    /// Spawns the pulse thread. `pulse` runs once per pulse with the time it
    /// actually fired and returns the interval to the next pulse, or `None`
    /// to end generation.
    pub fn start<F>(start_delay: Duration, mut pulse: F) -> io::Result<Self>
    where
        F: FnMut(Instant) -> Option<Duration> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        info!("Starting clock generator, first pulse in {:?}", start_delay);

        let thread_handle = thread::Builder::new()
            .name("clocksync-pulse".to_string())
            .spawn(move || {
                let mut deadline = Instant::now() + start_delay;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match shutdown_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let fired = Instant::now();
                    let Some(interval) = pulse(fired) else {
                        break;
                    };

                    deadline += interval;
                    if fired > deadline + interval {
                        // Fell more than a pulse behind; realign instead of bursting.
                        trace!("Generator late by {:?}, realigning", fired - deadline);
                        deadline = fired + interval;
                    }
                }
                debug!("Clock generator thread exiting");
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            thread_handle: Some(thread_handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Stopped from inside the pulse callback; the loop exits on its own.
                return;
            }
            let _ = handle.join();
            info!("Clock generator stopped");
        }
    }
}

impl Drop for ClockGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_next_boundary() {
        assert!((next_boundary(1000.2, 0.5) - 1000.5).abs() < 1e-9);
        assert!((next_boundary(7.0, 2.0) - 8.0).abs() < 1e-9);
        assert!((next_boundary(8.0, 2.0) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_beat_quantized_delay_at_120bpm() {
        let delay = quantized_start_delay(1000.2, 120.0, 4, StartQuantize::Beat);
        assert!((delay.as_secs_f64() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_bar_quantized_delay() {
        // bar of 4 beats at 120 BPM is 2 seconds
        let delay = quantized_start_delay(1001.5, 120.0, 4, StartQuantize::Bar);
        assert!((delay.as_secs_f64() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_unquantized_start_is_immediate() {
        let delay = quantized_start_delay(1000.2, 120.0, 4, StartQuantize::None);
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn test_start_quantize_parsing() {
        assert_eq!("Bar".parse::<StartQuantize>().unwrap(), StartQuantize::Bar);
        assert_eq!(StartQuantize::Beat.to_string(), "beat");
    }

    #[test]
    fn test_generator_stops_synchronously() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let mut generator = ClockGenerator::start(Duration::ZERO, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Duration::from_millis(2))
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        generator.stop();
        assert!(!generator.is_running());
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_callback_can_end_generation() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let generator = ClockGenerator::start(Duration::ZERO, move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            (n < 5).then(|| Duration::from_millis(1))
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(!generator.is_running());
    }
}
