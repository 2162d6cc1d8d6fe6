use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tinylink_shortener::ServiceSettings;
use tinylink_storage::StorageConfig;

pub const DATABASE_DSN_ENV: &str = "TINYLINK_DATABASE_DSN";
pub const FILE_STORAGE_PATH_ENV: &str = "TINYLINK_FILE_STORAGE_PATH";
pub const TIMEOUT_ENV: &str = "TINYLINK_TIMEOUT";
pub const BASE_URL_ENV: &str = "TINYLINK_BASE_URL";
pub const LOG_JSON_ENV: &str = "TINYLINK_LOG_JSON";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Parser)]
#[command(name = "tinylink", about = "Shorten, resolve and delete links")]
pub struct Cli {
    /// Postgres connection string. Takes precedence over the file path.
    #[arg(long, global = true, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// JSON document used when no database is configured.
    #[arg(long, global = true, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// Budget for the whole command, in seconds.
    #[arg(long, global = true, env = TIMEOUT_ENV, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Prefix joined with short codes when printing links.
    #[arg(long, global = true, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = LOG_JSON_ENV)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one or more URLs on behalf of a user.
    Shorten {
        #[arg(long)]
        user: String,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print the link stored under a short code.
    Resolve { code: String },
    /// List every link a user owns, deleted ones included.
    List {
        #[arg(long)]
        user: String,
    },
    /// Mark short codes owned by a user as deleted.
    Delete {
        #[arg(long)]
        user: String,
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Probe the configured storage backend.
    Health,
    /// Print link and user counters.
    Stats,
}

impl Cli {
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            database_dsn: self.database_dsn.clone(),
            file_path: self.file_storage_path.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Detached deletions share the command's time budget.
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings::builder()
            .background_timeout(self.timeout())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shorten() {
        let cli = Cli::try_parse_from([
            "tinylink",
            "shorten",
            "--user",
            "user-a",
            "http://a.com",
            "http://b.com",
        ])
        .unwrap();

        assert_eq!(cli.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cli.base_url, DEFAULT_BASE_URL);
        match cli.command {
            Command::Shorten { user, urls } => {
                assert_eq!(user, "user-a");
                assert_eq!(urls, vec!["http://a.com", "http://b.com"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn delete_requires_codes() {
        assert!(Cli::try_parse_from(["tinylink", "delete", "--user", "user-a"]).is_err());
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "tinylink",
            "stats",
            "--file-storage-path",
            "/tmp/links.json",
            "--timeout",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.timeout, 5);
        assert_eq!(
            cli.storage_config().file_path,
            Some(PathBuf::from("/tmp/links.json"))
        );
    }

    #[test]
    fn timeout_bounds_background_deletion() {
        let cli = Cli::try_parse_from([
            "tinylink",
            "delete",
            "--user",
            "user-a",
            "398f0ca4",
            "--timeout",
            "7",
        ])
        .unwrap();

        assert_eq!(cli.service_settings().background_timeout, Duration::from_secs(7));
    }
}
