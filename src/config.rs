use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "AutoPA";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "AUTOPA_DATA_DIR";

/// Get the application data directory.
/// `$AUTOPA_DATA_DIR` when set, otherwise ~/AutoPA/ (falls back to the
/// working directory when no home directory can be determined).
pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the case database path
pub fn case_database_path() -> PathBuf {
    app_data_dir().join("autopa.db")
}

/// Get the artifact root (uploaded files and rendered pages, per case)
pub fn artifacts_dir() -> PathBuf {
    app_data_dir().join("cases")
}

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,autopa=debug"
    } else {
        "info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_database_under_app_data() {
        let db = case_database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("autopa.db"));
    }

    #[test]
    fn artifacts_dir_under_app_data() {
        let artifacts = artifacts_dir();
        assert!(artifacts.starts_with(app_data_dir()));
        assert!(artifacts.ends_with("cases"));
    }

    #[test]
    fn app_name_is_autopa() {
        assert_eq!(APP_NAME, "AutoPA");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
