#[cfg(test)]
mod tests {
    use clocksyncrs::clock::pulse_interval_secs;
    use clocksyncrs::midi::MidiMessage;
    use clocksyncrs::*;

    fn external_clock() -> ClockSync {
        ClockSync::new(SyncConfig {
            mode: SyncMode::External,
            ..SyncConfig::default()
        })
        .unwrap()
    }

    fn pulses(sync: &ClockSync, from: f64, count: usize) -> f64 {
        let interval = pulse_interval_secs(120.0, 24);
        let mut t = from;
        for _ in 0..count {
            t += interval;
            sync.receive_clock_pulse(t);
        }
        t
    }

    #[test]
    fn test_song_position_in_every_state() {
        let sync = external_clock();

        // Stopped, before any Start
        sync.receive_song_position(16, 0.1);
        assert_eq!(sync.get_timing_info().beat_position, 16.0);
        assert_eq!(sync.transport_state(), TransportState::Stopped);

        sync.receive_transport(TransportMessage::Start, 0.2);
        pulses(&sync, 0.2, 10);
        sync.receive_song_position(16, 0.5);
        assert_eq!(sync.get_timing_info().beat_position, 16.0);
        assert_eq!(sync.transport_state(), TransportState::Playing);

        sync.receive_transport(TransportMessage::Stop, 0.6);
        sync.receive_song_position(16, 0.7);
        assert_eq!(sync.get_timing_info().beat_position, 16.0);
        assert_eq!(sync.transport_state(), TransportState::Stopped);

        sync.receive_transport(TransportMessage::Continue, 0.8);
        sync.receive_song_position(16, 0.9);
        assert_eq!(sync.get_timing_info().beat_position, 16.0);
        assert_eq!(sync.transport_state(), TransportState::Continuing);
    }

    #[test]
    fn test_continue_resumes_from_song_position() {
        let sync = external_clock();
        sync.receive_transport(TransportMessage::Start, 0.0);
        sync.receive_transport(TransportMessage::Stop, 0.1);
        sync.receive_song_position(8, 0.2);
        sync.receive_transport(TransportMessage::Continue, 0.3);
        pulses(&sync, 0.3, 24);

        let info = sync.get_timing_info();
        assert_eq!(info.beat_position, 9.0);
        assert_eq!(info.bar, 3);
        assert_eq!(info.beat_in_bar, 2);
    }

    #[test]
    fn test_continue_without_start_acts_as_start() {
        let sync = external_clock();
        sync.locate(4.0);
        sync.receive_transport(TransportMessage::Continue, 0.0);
        assert_eq!(sync.transport_state(), TransportState::Playing);
        assert_eq!(sync.state().position_ticks, 0);
    }

    #[test]
    fn test_start_resets_position() {
        let sync = external_clock();
        sync.receive_transport(TransportMessage::Start, 0.0);
        pulses(&sync, 0.0, 48);
        assert_eq!(sync.get_timing_info().beat_position, 2.0);

        sync.receive_transport(TransportMessage::Start, 1.5);
        assert_eq!(sync.get_timing_info().beat_position, 0.0);
        assert!(sync.state().is_playing);
    }

    #[test]
    fn test_stop_keeps_position_until_next_start() {
        let sync = external_clock();
        sync.receive_transport(TransportMessage::Start, 0.0);
        let t = pulses(&sync, 0.0, 48);
        sync.receive_transport(TransportMessage::Stop, t + 0.01);
        assert_eq!(sync.get_timing_info().beat_position, 2.0);

        sync.receive_transport(TransportMessage::Start, t + 0.02);
        assert_eq!(sync.get_timing_info().beat_position, 0.0);
    }

    #[test]
    fn test_position_frozen_while_stopped() {
        let sync = external_clock();
        pulses(&sync, 0.0, 24);
        assert_eq!(sync.state().position_ticks, 0);
    }

    #[test]
    fn test_stop_flushes_sounding_notes() {
        let sync = external_clock();
        let rx = sync.output();
        let mut track = Track::new("pad");
        track.insert_event(MidiEvent::note_on(0, 60, 100, 0.0, Some(4.0)));
        sync.add_track(track);

        sync.receive_transport(TransportMessage::Start, 0.0);
        pulses(&sync, 0.0, 2);
        sync.receive_transport(TransportMessage::Stop, 0.1);
        pulses(&sync, 0.1, 24);

        let sent: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            sent,
            vec![
                MidiMessage::NoteOn {
                    channel: 0,
                    note: 60,
                    velocity: 100
                },
                MidiMessage::NoteOff {
                    channel: 0,
                    note: 60,
                    velocity: 0
                },
            ]
        );
    }

    #[test]
    fn test_transport_changes_are_published() {
        let sync = external_clock();
        let sub = sync.subscribe();
        sync.receive_transport(TransportMessage::Start, 0.0);
        sync.receive_transport(TransportMessage::Stop, 0.1);
        sync.receive_transport(TransportMessage::Stop, 0.2);

        let changes: Vec<_> = sub
            .events
            .try_iter()
            .filter_map(|e| match e {
                SyncEvent::TransportChanged(state) => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![TransportState::Playing, TransportState::Stopped]);
    }
}
