//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[sqlite]
path = /var/lib/folioquant/prices.db
pool_size = 8

[engine]
workers = 4

[benchmarks]
cad = XIC
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("sqlite", "path"),
            Some("/var/lib/folioquant/prices.db".to_string())
        );
        assert_eq!(adapter.get_int("sqlite", "pool_size", 4), 8);
        assert_eq!(adapter.get_int("engine", "workers", 2), 4);
        assert_eq!(adapter.get_string("benchmarks", "cad"), Some("XIC".to_string()));
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[sqlite]\npath = prices.db\n").unwrap();
        assert_eq!(adapter.get_string("sqlite", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[engine]\nworkers = abc\n").unwrap();
        assert_eq!(adapter.get_int("engine", "workers", 2), 2);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter =
            FileConfigAdapter::from_string("[engine]\nfetch_timeout_secs = 2.5\n").unwrap();
        assert_eq!(adapter.get_double("engine", "fetch_timeout_secs", 0.0), 2.5);
    }

    #[test]
    fn get_bool_parses_common_forms() {
        let adapter =
            FileConfigAdapter::from_string("[engine]\na = true\nb = no\nc = 1\n").unwrap();
        assert!(adapter.get_bool("engine", "a", false));
        assert!(!adapter.get_bool("engine", "b", true));
        assert!(adapter.get_bool("engine", "c", false));
        assert!(adapter.get_bool("engine", "missing", true));
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[sqlite]\npath = prices.db\n").unwrap();

        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_string("sqlite", "path"), Some("prices.db".to_string()));
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        assert!(FileConfigAdapter::from_file("/nonexistent/config.ini").is_err());
    }
}
