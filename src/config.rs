use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Remitra";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset
pub fn default_log_filter() -> String {
    "remitra=info".to_string()
}

/// Get the application data directory
/// ~/Remitra/ on all platforms (user-visible, per design requirement)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Remitra")
}

/// Get the billing database path (claims, fee schedules, sequences)
pub fn database_path() -> PathBuf {
    app_data_dir().join("billing.db")
}
