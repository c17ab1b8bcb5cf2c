#[cfg(test)]
mod tests {
    use clocksyncrs::clock::pulse_interval_secs;
    use clocksyncrs::midi::MidiMessage;
    use clocksyncrs::*;
    use crossbeam::channel::Receiver;

    fn external_clock() -> ClockSync {
        ClockSync::new(SyncConfig {
            mode: SyncMode::External,
            ..SyncConfig::default()
        })
        .unwrap()
    }

    /// Feeds `count` evenly spaced pulses starting at `start`; returns the
    /// timestamp of the last one.
    fn feed(sync: &ClockSync, bpm: f64, start: f64, count: usize) -> f64 {
        let interval = pulse_interval_secs(bpm, 24);
        let mut t = start;
        for i in 0..count {
            t = start + i as f64 * interval;
            sync.receive_clock_pulse(t);
        }
        t
    }

    fn events(rx: &Receiver<SyncEvent>) -> Vec<SyncEvent> {
        rx.try_iter().collect()
    }

    fn count(events: &[SyncEvent], wanted: &SyncEvent) -> usize {
        events.iter().filter(|e| *e == wanted).count()
    }

    #[test]
    fn test_steady_train_syncs_and_detects_tempo() {
        let sync = external_clock();
        let sub = sync.subscribe();
        feed(&sync, 120.0, 1.0, 49);

        let info = sync.get_timing_info();
        assert!(info.is_synced);
        let detected = info.detected_bpm.expect("tempo detected");
        assert!((detected - 120.0).abs() < 0.5, "detected {}", detected);
        assert_eq!(count(&events(&sub.events), &SyncEvent::SyncAcquired), 1);
    }

    #[test]
    fn test_not_synced_before_window_fills() {
        let sync = external_clock();
        // 23 intervals
        feed(&sync, 120.0, 1.0, 24);
        assert!(!sync.is_synced());
        sync.receive_clock_pulse(1.0 + 24.0 * pulse_interval_secs(120.0, 24));
        assert!(sync.is_synced());
    }

    #[test]
    fn test_large_tempo_change_relocks() {
        let sync = external_clock();
        assert_eq!(sync.bpm(), 120.0);
        feed(&sync, 100.0, 1.0, 49);
        assert!((sync.bpm() - 100.0).abs() < 0.5, "applied {}", sync.bpm());
    }

    #[test]
    fn test_small_drift_is_pulled_gently() {
        let sync = external_clock();
        // 5 BPM off: one 5% step per quarter note
        feed(&sync, 125.0, 1.0, 25);
        let bpm = sync.bpm();
        assert!(bpm > 120.0 && bpm < 121.0, "applied {}", bpm);
    }

    #[test]
    fn test_dropout_reported_once_then_recovering_once() {
        let sync = external_clock();
        let sub = sync.subscribe();
        // 40 BPM: pulses every 62.5 ms, so recovery (1 s) comes before resync (1.5 s)
        let last = feed(&sync, 40.0, 1.0, 30);
        assert!(sync.is_synced());

        let resume = last + 1.0;
        assert_eq!(sync.receive_clock_pulse(resume), PulseOutcome::Dropout);
        assert!(!sync.is_synced());

        feed(&sync, 40.0, resume + pulse_interval_secs(40.0, 24), 40);
        assert!(sync.is_synced());

        let seen = events(&sub.events);
        assert_eq!(count(&seen, &SyncEvent::SyncLost), 1);
        assert_eq!(count(&seen, &SyncEvent::Recovering), 1);
        assert_eq!(count(&seen, &SyncEvent::SyncAcquired), 2);

        let recovering = seen.iter().position(|e| *e == SyncEvent::Recovering);
        let resynced = seen.iter().rposition(|e| *e == SyncEvent::SyncAcquired);
        assert!(recovering < resynced);
    }

    #[test]
    fn test_silence_detected_by_poll_is_not_reported_twice() {
        let sync = external_clock();
        let sub = sync.subscribe();
        let last = feed(&sync, 120.0, 1.0, 30);

        sync.poll_at(last + 0.6);
        sync.poll_at(last + 0.7);
        sync.receive_clock_pulse(last + 0.8);

        assert_eq!(count(&events(&sub.events), &SyncEvent::SyncLost), 1);
    }

    #[test]
    fn test_dropout_at_120bpm_recovers_without_poll() {
        let sync = external_clock();
        let sub = sync.subscribe();
        let last = feed(&sync, 120.0, 1.0, 30);

        let resume = last + 2.0;
        assert_eq!(sync.receive_clock_pulse(resume), PulseOutcome::Dropout);
        feed(&sync, 120.0, resume + pulse_interval_secs(120.0, 24), 100);
        assert!(sync.is_synced());

        let seen = events(&sub.events);
        assert_eq!(count(&seen, &SyncEvent::SyncLost), 1);
        assert_eq!(count(&seen, &SyncEvent::Recovering), 1);
    }

    #[test]
    fn test_playback_coasts_through_dropout() {
        let sync = external_clock();
        let rx = sync.output();
        let mut track = Track::new("lead");
        track.insert_event(MidiEvent::note_on(0, 67, 100, 3.0, None));
        sync.add_track(track);

        sync.receive_transport(TransportMessage::Start, 0.5);
        let last = feed(&sync, 120.0, 1.0, 24);
        assert_eq!(sync.get_timing_info().beat_position, 1.0);

        // Two beats per second at 120 BPM while no pulse arrives
        sync.poll_at(last + 1.0);
        let coasted = sync.get_timing_info().beat_position;
        assert!((coasted - 3.0).abs() <= 1.0 / 24.0 + 1e-9, "at {}", coasted);

        sync.poll_at(last + 2.0);
        sync.receive_clock_pulse(last + 2.0);
        assert_eq!(sync.state().position_ticks, 120 * 4);
        assert_eq!(sync.bpm(), 120.0);

        let played: Vec<_> = rx.try_iter().collect();
        assert!(played.contains(&MidiMessage::NoteOn {
            channel: 0,
            note: 67,
            velocity: 100
        }));
    }

    #[test]
    fn test_pulse_ending_dropout_catches_up() {
        let sync = external_clock();
        sync.receive_transport(TransportMessage::Start, 0.5);
        let last = feed(&sync, 120.0, 1.0, 24);
        assert_eq!(sync.state().position_ticks, 24 * 4);

        // No poll ran during the gap; the missed pulses are filled in at once.
        sync.receive_clock_pulse(last + 2.0);
        assert_eq!(sync.state().position_ticks, (24 + 96) * 4);
        // Tempo is held, not re-estimated from the gap.
        assert_eq!(sync.bpm(), 120.0);
    }

    #[test]
    fn test_internal_mode_ignores_external_pulses() {
        let sync = ClockSync::new(SyncConfig::default()).unwrap();
        assert_eq!(sync.receive_clock_pulse(1.0), PulseOutcome::Ignored);
        assert_eq!(sync.get_clock_accuracy_report().stability_score, 0.0);
    }

    #[test]
    fn test_accuracy_report_for_clean_clock() {
        let sync = external_clock();
        feed(&sync, 120.0, 1.0, 97);
        let report = sync.get_clock_accuracy_report();
        assert!((report.avg_interval - pulse_interval_secs(120.0, 24)).abs() < 1e-9);
        assert!(report.stability_score > 0.99);
    }

    #[test]
    fn test_auto_falls_back_to_internal_once() {
        let sync = ClockSync::new(SyncConfig {
            mode: SyncMode::Auto,
            ..SyncConfig::default()
        })
        .unwrap();
        let sub = sync.subscribe();
        sync.start();
        assert!(!sync.is_generating());

        sync.poll_at(sync.now() + 6.0);
        assert!(sync.is_generating());
        assert_eq!(sync.receive_clock_pulse(sync.now()), PulseOutcome::Ignored);

        sync.poll_at(sync.now() + 20.0);
        assert_eq!(
            count(&events(&sub.events), &SyncEvent::FellBackToInternal),
            1
        );

        sync.stop();
        assert!(!sync.is_generating());
    }

    #[test]
    fn test_auto_syncing_in_time_keeps_external() {
        let sync = ClockSync::new(SyncConfig {
            mode: SyncMode::Auto,
            ..SyncConfig::default()
        })
        .unwrap();
        let last = feed(&sync, 120.0, 0.1, 30);
        assert!(sync.is_synced());

        sync.poll_at(last + 0.01);
        sync.poll_at(6.0);
        assert!(!sync.is_generating());
        assert_eq!(sync.sync_mode(), SyncMode::Auto);
    }
}
