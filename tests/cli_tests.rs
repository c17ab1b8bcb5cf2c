#[cfg(test)]
mod tests {
    use clap::Parser;
    use clocksyncrs::midi::{MidiEngine, MockMidiEngine};
    use clocksyncrs::*;

    fn mock_devices() -> Vec<String> {
        MockMidiEngine::new().list_devices()
    }

    #[test]
    fn test_args_with_device_binding() {
        let args = Args::parse_from(["test", "--bind-to-device", "Mock Device 1"]);
        assert_eq!(args.bind_to_device, Some("Mock Device 1".to_string()));
        assert!(!args.device_list);
    }

    #[test]
    fn test_args_without_device_binding() {
        let args = Args::parse_from(["test"]);
        assert_eq!(args.bind_to_device, None);
        assert!(!args.device_list);
        assert!(!args.demo_pattern);
        assert!(!args.log_stderr);
    }

    #[test]
    fn test_valid_device_binding() {
        assert!(validate_device("Mock Device 1", &mock_devices()).is_ok());
        assert!(validate_device("Device 2", &mock_devices()).is_ok());
    }

    #[test]
    fn test_invalid_device_binding() {
        let error = validate_device("Nonexistent Device", &mock_devices()).unwrap_err();
        assert!(error.contains("Nonexistent Device"));
        assert!(error.contains("  - Mock Device 1"));
    }

    #[test]
    fn test_clock_flags() {
        let args = Args::parse_from([
            "test",
            "--bpm",
            "98.5",
            "--mode",
            "auto",
            "--start-quantize",
            "bar",
        ]);
        assert_eq!(args.bpm, Some(98.5));
        assert_eq!(args.mode, Some(SyncMode::Auto));
        assert_eq!(args.start_quantize, Some(StartQuantize::Bar));
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(Args::try_parse_from(["test", "--mode", "sometimes"]).is_err());
    }

    #[test]
    fn test_flags_override_settings() {
        let args = Args::parse_from(["test", "--mode", "external"]);
        let mut config = SyncConfig {
            bpm: 90.0,
            ..SyncConfig::default()
        };
        args.apply_to(&mut config);
        assert_eq!(config.mode, SyncMode::External);
        // Not given on the command line, so left alone
        assert_eq!(config.bpm, 90.0);
    }
}
