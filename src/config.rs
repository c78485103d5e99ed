//! Application settings: where the database lives and the circulation policy
//! (loan period, daily fine, borrowing limit).
//!
//! Settings are read from `~/.library-circulation/settings.toml`. Every key is
//! optional; a missing file yields the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;

/// Folder name used beneath the user's home directory for application data.
pub const DATA_DIR_NAME: &str = ".library-circulation";
/// SQLite file name stored inside the application data directory.
const DB_FILE_NAME: &str = "library.sqlite";
const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Loan rules applied by the circulation engine.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoanPolicy {
    /// Days between borrowing and the due date; also the renewal extension.
    pub loan_days: i64,
    /// Fine charged per whole day a book comes back late.
    pub daily_fine: f64,
    /// Maximum number of unreturned loans per user.
    pub max_active_loans: i64,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            loan_days: 7,
            daily_fine: 5.0,
            max_active_loans: 3,
        }
    }
}

impl LoanPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.loan_days <= 0 {
            bail!("policy.loan_days must be positive (got {})", self.loan_days);
        }
        if !(self.daily_fine.is_finite() && self.daily_fine >= 0.0) {
            bail!("policy.daily_fine must be zero or positive (got {})", self.daily_fine);
        }
        if self.max_active_loans <= 0 {
            bail!(
                "policy.max_active_loans must be positive (got {})",
                self.max_active_loans
            );
        }
        Ok(())
    }

    pub fn fine_for(&self, days_overdue: i64) -> f64 {
        days_overdue.max(0) as f64 * self.daily_fine
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub database_path: Option<PathBuf>,
    pub policy: LoanPolicy,
}

impl Settings {
    /// Load the settings file from the data directory, falling back to the
    /// defaults when it does not exist.
    pub fn load() -> Result<Self> {
        let path = data_dir()?.join(SETTINGS_FILE_NAME);
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents).context("failed to parse TOML")?;
        settings.policy.validate()?;
        Ok(settings)
    }

    /// Resolve the database location: explicit override first, then the
    /// settings file, then the default inside the data directory.
    pub fn resolve_database_path(&self, cli_override: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = cli_override {
            return Ok(path);
        }
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        Ok(data_dir()?.join(DB_FILE_NAME))
    }
}

/// Absolute path to the application data directory inside the user's home.
pub fn data_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.policy.loan_days, 7);
        assert_eq!(settings.policy.max_active_loans, 3);
        assert_eq!(settings.policy.daily_fine, 5.0);
    }

    #[test]
    fn partial_policy_keeps_other_defaults() {
        let settings = Settings::parse(
            "database_path = \"/tmp/lib.sqlite\"\n[policy]\ndaily_fine = 2.5\n",
        )
        .unwrap();
        assert_eq!(settings.database_path, Some(PathBuf::from("/tmp/lib.sqlite")));
        assert_eq!(settings.policy.daily_fine, 2.5);
        assert_eq!(settings.policy.loan_days, 7);
    }

    #[test]
    fn rejects_non_positive_limits() {
        assert!(Settings::parse("[policy]\nmax_active_loans = 0\n").is_err());
        assert!(Settings::parse("[policy]\nloan_days = -1\n").is_err());
        assert!(Settings::parse("[policy]\nunknown = 1\n").is_err());
    }

    #[test]
    fn cli_override_wins() {
        let settings = Settings {
            database_path: Some(PathBuf::from("from-settings.sqlite")),
            ..Settings::default()
        };
        let path = settings
            .resolve_database_path(Some(PathBuf::from("cli.sqlite")))
            .unwrap();
        assert_eq!(path, PathBuf::from("cli.sqlite"));
        let path = settings.resolve_database_path(None).unwrap();
        assert_eq!(path, PathBuf::from("from-settings.sqlite"));
    }

    #[test]
    fn fine_is_linear_in_days() {
        let policy = LoanPolicy::default();
        assert_eq!(policy.fine_for(3), 15.0);
        assert_eq!(policy.fine_for(0), 0.0);
        assert_eq!(policy.fine_for(-2), 0.0);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
