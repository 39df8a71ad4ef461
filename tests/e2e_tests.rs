//! End-to-end integration tests
//!
//! These tests validate the complete replay pipeline using predefined CSV
//! fixtures. Each test:
//! 1. Reads input.csv (and config.json, when present) from a fixture directory
//! 2. Replays the journal through the ledger
//! 3. Compares the balance CSV with expected.csv
//!
//! Fixtures live in tests/fixtures/. Each fixture is run twice, once with the
//! sequential strategy and once with the concurrent one, and both must
//! produce the same balances.

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;
    use wallet_ledger::cli::StrategyType;
    use wallet_ledger::config::AppConfig;
    use wallet_ledger::strategy::{create_strategy, BatchConfig};

    /// Replay tests/fixtures/{fixture_name}/input.csv and compare with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if fixture files cannot be read or the output does not match.
    fn run_test_fixture(fixture_name: &str, strategy_type: StrategyType) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);
        let config_path = format!("{}/config.json", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );

        let config_path = Path::new(&config_path);
        let config = AppConfig::load(config_path.exists().then_some(config_path))
            .unwrap_or_else(|e| panic!("Failed to load fixture config: {}", e));

        // Small batches so the concurrent strategy crosses batch boundaries
        let strategy = create_strategy(strategy_type, Some(BatchConfig::new(3, 4)), config);

        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");
        strategy
            .process(Path::new(&input_path), &mut temp_output)
            .unwrap_or_else(|e| panic!("Failed to replay journal: {}", e));
        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (strategy: {:?})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, strategy_type, actual_output, expected_output
        );
    }

    #[rstest]
    #[case("happy_path")]
    #[case("insufficient_funds")]
    #[case("invalid_operations")]
    #[case("duplicate_deposits")]
    #[case("precision_rounding")]
    #[case("malformed_data")]
    #[case("operator_fees")]
    #[case("forwarded_funds")]
    fn test_fixtures(
        #[case] fixture: &str,
        #[values(StrategyType::Sync, StrategyType::Async)] strategy: StrategyType,
    ) {
        run_test_fixture(fixture, strategy);
    }
}
