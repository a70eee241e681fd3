//! Cache configuration options

/// Level at which cache activity (parameter collection, hits, stores) is
/// logged. `None` disables usage logging entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    #[default]
    None,
    Debug,
    Info,
    Notice,
    Warning,
    Log,
}

impl LogLevel {
    pub fn is_enabled(self) -> bool {
        !matches!(self, LogLevel::None)
    }

    /// Emit one usage message at this level through `tracing`.
    pub fn log(self, message: std::fmt::Arguments<'_>) {
        match self {
            LogLevel::None => {}
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info | LogLevel::Notice | LogLevel::Log => tracing::info!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(LogLevel::None),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "notice" => Ok(LogLevel::Notice),
            "warning" => Ok(LogLevel::Warning),
            "log" => Ok(LogLevel::Log),
            other => Err(format!("unrecognized log level \"{}\"", other)),
        }
    }
}

/// Configuration for the caching planner
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Global kill switch; when off every call bypasses to the external
    /// planner
    pub enabled: bool,
    /// Whether cache misses may build and persist new entries. Off by
    /// default: the cache serves existing plans but learns nothing.
    pub write_mode: bool,
    /// Usage logging level for hit/store/parameter events
    pub log_level: LogLevel,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            write_mode: false,
            log_level: LogLevel::None,
        }
    }
}

impl CacheConfig {
    /// Create a disabled cache configuration
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Enable or disable the cache
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Arm or disarm the write path
    pub fn with_write_mode(mut self, write_mode: bool) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// Set the usage logging level
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert!(!config.write_mode);
        assert_eq!(config.log_level, LogLevel::None);
    }

    #[test]
    fn test_builder_pattern() {
        let config = CacheConfig::default()
            .with_write_mode(true)
            .with_log_level(LogLevel::Debug);

        assert!(config.write_mode);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.log_level.is_enabled());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("none".parse::<LogLevel>().unwrap(), LogLevel::None);
        assert!("verbose".parse::<LogLevel>().is_err());
    }
}
