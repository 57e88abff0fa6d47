use std::path::PathBuf;
use std::sync::OnceLock;

// Cache the paths to avoid repeated environment lookups
static PLASTICOME_HOME: OnceLock<PathBuf> = OnceLock::new();
static PLASTICOME_WORK_DIR: OnceLock<PathBuf> = OnceLock::new();
static PLASTICOME_DATABASES_DIR: OnceLock<PathBuf> = OnceLock::new();
static PLASTICOME_OUTBOX_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Get the Plasticome home directory
/// Checks PLASTICOME_HOME environment variable, falls back to ${HOME}/.plasticome
pub fn plasticome_home() -> PathBuf {
    PLASTICOME_HOME
        .get_or_init(|| {
            if let Ok(path) = std::env::var("PLASTICOME_HOME") {
                PathBuf::from(path)
            } else {
                let home = std::env::var("HOME").unwrap_or_else(|_| {
                    std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string())
                });
                PathBuf::from(home).join(".plasticome")
            }
        })
        .clone()
}

/// Root of the per-request working directories
/// Checks PLASTICOME_WORK_DIR, falls back to PLASTICOME_HOME/work
pub fn plasticome_work_dir() -> PathBuf {
    PLASTICOME_WORK_DIR
        .get_or_init(|| {
            if let Ok(path) = std::env::var("PLASTICOME_WORK_DIR") {
                PathBuf::from(path)
            } else {
                plasticome_home().join("work")
            }
        })
        .clone()
}

/// Request-independent reference database directory
/// Checks PLASTICOME_DATABASES_DIR, falls back to PLASTICOME_HOME/databases
pub fn plasticome_databases_dir() -> PathBuf {
    PLASTICOME_DATABASES_DIR
        .get_or_init(|| {
            if let Ok(path) = std::env::var("PLASTICOME_DATABASES_DIR") {
                PathBuf::from(path)
            } else {
                plasticome_home().join("databases")
            }
        })
        .clone()
}

/// Delivery outbox used by the outbox notifier
/// Checks PLASTICOME_OUTBOX_DIR, falls back to PLASTICOME_HOME/outbox
pub fn plasticome_outbox_dir() -> PathBuf {
    PLASTICOME_OUTBOX_DIR
        .get_or_init(|| {
            if let Ok(path) = std::env::var("PLASTICOME_OUTBOX_DIR") {
                PathBuf::from(path)
            } else {
                plasticome_home().join("outbox")
            }
        })
        .clone()
}

/// Default configuration file location
pub fn config_path() -> PathBuf {
    plasticome_home().join("config.toml")
}

/// Working directory owned by one request
pub fn request_dir(work_root: &std::path::Path, request_id: &str) -> PathBuf {
    work_root.join(request_id)
}

/// Get a human-readable description of the current path configuration
pub fn describe_paths() -> String {
    format!(
        "Plasticome Paths:\n  \
        Home: {}\n  \
        Work: {}\n  \
        Databases: {}\n  \
        Outbox: {}",
        plasticome_home().display(),
        plasticome_work_dir().display(),
        plasticome_databases_dir().display(),
        plasticome_outbox_dir().display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_request_dir_is_scoped_by_id() {
        let dir = request_dir(Path::new("/srv/work"), "abc-123");
        assert_eq!(dir, PathBuf::from("/srv/work/abc-123"));
    }

    #[test]
    fn test_derived_dirs_live_under_home_by_default() {
        if std::env::var("PLASTICOME_WORK_DIR").is_err() && std::env::var("PLASTICOME_HOME").is_err() {
            assert!(plasticome_work_dir().ends_with(".plasticome/work"));
        }
        assert!(describe_paths().contains("Databases:"));
    }
}
