//! Command-line surface.
//!
//! Every option can come from a flag, an environment variable, or an
//! optional config file. Flags and environment variables override values
//! read from the file.

use clap::Parser;
use std::path::PathBuf;

use crate::config::CopierConfig;
use crate::error::Result;

/// Copy tagged RDS instance snapshots into another region.
#[derive(Debug, Parser)]
#[command(name = "rds-snapshot-copier")]
#[command(about = "Copies the latest snapshot of tagged RDS instances to another region", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (.toml or .json) read before flags are applied.
    #[arg(short, long, env = "COPIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log intended copies and deletions without performing them.
    #[arg(short, long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Default log level; `RUST_LOG` takes precedence.
    #[arg(short, long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Copies in flight at once (1 to 6).
    #[arg(short = 'f', long = "max-inflight", env = "MAX_SNAPSHOT_FLIGHT")]
    pub max_copy_in_flight: Option<usize>,

    /// Copies to keep per instance in the target region; 0 keeps all.
    #[arg(short, long, env = "MAX_SNAPSHOT_TARGET")]
    pub max_snapshots: Option<usize>,

    /// Minutes between iterations; 0 starts the next one immediately.
    #[arg(short, long = "run-every", env = "RUN_EVERY_MINS")]
    pub run_every_mins: Option<u64>,

    /// Region to copy snapshots from.
    #[arg(short, long, env = "SOURCE_REGION")]
    pub source_region: Option<String>,

    /// Tag key selecting instances to copy.
    #[arg(short = 'a', long, env = "TAG")]
    pub tag: Option<String>,

    /// KMS key for encrypting copies at the target.
    #[arg(short = 'k', long, env = "TARGET_KMS")]
    pub target_kms: Option<String>,

    /// Region to copy snapshots into.
    #[arg(short, long, env = "TARGET_REGION")]
    pub target_region: Option<String>,

    /// Stop waiting on a single copy after this many seconds.
    #[arg(long, env = "MAX_COPY_WAIT_SECS")]
    pub max_copy_wait_secs: Option<u64>,
}

impl Cli {
    /// Build the validated process config.
    pub fn into_config(self) -> Result<CopierConfig> {
        let mut config = match &self.config {
            Some(path) => CopierConfig::from_file(path)?,
            None => CopierConfig::default(),
        };

        config.dry_run |= self.dry_run;
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(n) = self.max_copy_in_flight {
            config.max_copy_in_flight = n;
        }
        if let Some(n) = self.max_snapshots {
            config.max_snapshots = n;
        }
        if let Some(mins) = self.run_every_mins {
            config.run_every_mins = mins;
        }
        if let Some(region) = self.source_region {
            config.source_region = region;
        }
        if let Some(tag) = self.tag {
            config.tag = tag;
        }
        if let Some(key) = self.target_kms {
            config.target_kms_key = Some(key);
        }
        if let Some(region) = self.target_region {
            config.target_region = region;
        }
        if let Some(secs) = self.max_copy_wait_secs {
            config.max_copy_wait_secs = Some(secs);
        }

        config.normalize();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const REQUIRED: [&str; 7] = [
        "rds-snapshot-copier",
        "-s",
        "us-east-1",
        "-t",
        "us-west-2",
        "-a",
        "backup",
    ];

    fn parse(extra: &[&str]) -> Result<CopierConfig> {
        let args: Vec<&str> = REQUIRED.iter().chain(extra.iter()).copied().collect();
        Cli::try_parse_from(args).unwrap().into_config()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.source_region, "us-east-1");
        assert_eq!(config.target_region, "us-west-2");
        assert_eq!(config.tag, "backup");
        assert_eq!(config.max_copy_in_flight, 2);
        assert_eq!(config.max_snapshots, 0);
        assert_eq!(config.run_every_mins, 0);
        assert!(!config.dry_run);
        assert!(!config.encrypted());
    }

    #[test]
    fn test_short_flags() {
        let config = parse(&["-d", "-f", "4", "-m", "7", "-r", "30", "-k", "alias/dr", "-l", "DEBUG"]).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.max_copy_in_flight, 4);
        assert_eq!(config.max_snapshots, 7);
        assert_eq!(config.run_every_mins, 30);
        assert_eq!(config.target_kms_key.as_deref(), Some("alias/dr"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_fatal_log_level_is_accepted() {
        let config = parse(&["-l", "fatal"]).unwrap();
        assert_eq!(config.log_level, "error");
    }

    #[test]
    fn test_blank_kms_key_means_unencrypted() {
        let config = parse(&["-k", "  "]).unwrap();
        assert!(!config.encrypted());
    }

    #[test]
    fn test_invalid_inflight_rejected() {
        assert!(parse(&["-f", "0"]).is_err());
        assert!(parse(&["-f", "7"]).is_err());
    }

    #[test]
    fn test_missing_region_rejected() {
        let cli = Cli::try_parse_from(["rds-snapshot-copier", "-s", "us-east-1", "-a", "backup"]).unwrap();
        assert!(cli.into_config().is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "source_region = \"eu-west-1\"\ntarget_region = \"eu-central-1\"\ntag = \"from-file\"\nmax_snapshots = 3"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = Cli::try_parse_from(["rds-snapshot-copier", "-c", &path, "-a", "from-flag"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.source_region, "eu-west-1");
        assert_eq!(config.target_region, "eu-central-1");
        assert_eq!(config.tag, "from-flag");
        assert_eq!(config.max_snapshots, 3);
    }
}
