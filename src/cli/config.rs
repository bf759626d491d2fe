//! Configuration conversion utilities for CLI arguments

use crate::backends::OnnxRemoverConfig;
use crate::cli::main_impl::Cli;
use crate::config::{BatchConfig, ExecutionProvider, LosslessFormat};
use anyhow::{Context, Result};
use std::time::Duration;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Convert CLI arguments to a `BatchConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the batch configuration from CLI arguments
    ///
    /// Starts from `--config` (or the defaults) and overrides only the
    /// values given on the command line.
    pub(crate) fn from_cli(cli: &Cli) -> Result<BatchConfig> {
        let mut config = match &cli.config {
            Some(path) => BatchConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => BatchConfig::default(),
        };

        if let Some(provider) = &cli.execution_provider {
            config.execution_provider = Self::parse_provider(provider)?;
        }
        if let Some(format) = cli.format {
            config.archive.format = LosslessFormat::from(format);
        }
        if let Some(mib) = cli.max_size_mb {
            config.max_upload_bytes = Self::mib_to_bytes(mib)?;
        }
        if let Some(seconds) = cli.timeout {
            let timeout = Self::parse_timeout(seconds)?;
            config.removal_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1));
        }
        if let Some(jobs) = cli.jobs {
            config.max_concurrency = jobs;
        }
        if cli.keep_duplicate_names {
            config.archive.deduplicate_names = false;
        }
        if cli.include_composites {
            config.archive.include_composites = true;
        }

        config.validate().context("Invalid batch configuration")?;
        Ok(config)
    }

    /// Settings for the ONNX remover
    pub(crate) fn remover_config(cli: &Cli) -> OnnxRemoverConfig {
        let mut config = OnnxRemoverConfig::default();
        if let Some(model) = &cli.model {
            config.model_path.clone_from(model);
        }
        if let Some(size) = cli.model_input_size {
            config.input_size = size;
        }
        config
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(provider) = &cli.execution_provider {
            Self::parse_provider(provider)?;
        }
        if let Some(mib) = cli.max_size_mb {
            Self::mib_to_bytes(mib)?;
        }
        if let Some(seconds) = cli.timeout {
            Self::parse_timeout(seconds)?;
        }
        if cli.jobs == Some(0) {
            anyhow::bail!("--jobs must be at least 1");
        }
        if cli.model_input_size == Some(0) {
            anyhow::bail!("--model-input-size must be greater than zero");
        }
        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid filename pattern '{pattern}'"))?;
        }
        Ok(())
    }

    fn parse_provider(value: &str) -> Result<ExecutionProvider> {
        value
            .parse::<ExecutionProvider>()
            .context("Invalid execution provider format")
    }

    fn mib_to_bytes(mib: f64) -> Result<u64> {
        if !mib.is_finite() || mib <= 0.0 {
            anyhow::bail!("--max-size-mb must be a positive number, got {mib}");
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok((mib * BYTES_PER_MIB).round().max(1.0) as u64)
    }

    fn parse_timeout(seconds: f64) -> Result<Duration> {
        if seconds <= 0.0 {
            anyhow::bail!("--timeout must be greater than zero, got {seconds}");
        }
        Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("Invalid timeout value {seconds}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["bgremove-batch"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_cli_config_defaults() {
        let config = CliConfigBuilder::from_cli(&parse(&["a.jpg"])).unwrap();
        assert_eq!(config, BatchConfig::default());
    }

    #[test]
    fn test_cli_config_conversion() {
        let cli = parse(&[
            "a.jpg",
            "-e",
            "onnx:cpu",
            "--format",
            "tiff",
            "--max-size-mb",
            "2",
            "--timeout",
            "1.5",
            "-j",
            "3",
            "--keep-duplicate-names",
            "--include-composites",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.archive.format, LosslessFormat::Tiff);
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.removal_timeout_ms, Some(1500));
        assert_eq!(config.max_concurrency, 3);
        assert!(!config.archive.deduplicate_names);
        assert!(config.archive.include_composites);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(&path, r#"{"max_concurrency": 4, "execution_provider": "cuda"}"#).unwrap();
        let path_arg = path.display().to_string();

        let config = CliConfigBuilder::from_cli(&parse(&["a.jpg", "--config", &path_arg, "-e", "cpu"])).unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
    }

    #[test]
    fn test_cli_validation() {
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.jpg"])).is_ok());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.jpg", "-e", "invalid:provider"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.jpg", "--timeout", "0"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.jpg", "--max-size-mb", "0"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.jpg", "-j", "0"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.jpg", "--pattern", "[unclosed"])).is_err());
    }

    #[test]
    fn test_remover_config_from_cli() {
        let config = CliConfigBuilder::remover_config(&parse(&[
            "a.jpg",
            "-m",
            "/models/u2netp.onnx",
            "--model-input-size",
            "512",
        ]));
        assert_eq!(config.model_path, PathBuf::from("/models/u2netp.onnx"));
        assert_eq!(config.input_size, 512);
    }
}
