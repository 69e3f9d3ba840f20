//! Configuration access port trait.
//!
//! Lookups never fail: a missing value yields `None`. Parsing and range
//! checks live in `domain::config_validation`.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// A non-empty string value, trimmed.
    fn get_path(&self, section: &str, key: &str) -> Option<std::path::PathBuf> {
        self.get_string(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(std::path::PathBuf::from)
    }
}
