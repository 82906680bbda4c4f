use std::path::PathBuf;

const SENSITIVE_LOCATIONS_FILE: &str = "sensitive-locations.json";

/// Paths to the external tools and the sensitive-locations file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub exiftool: PathBuf,
    pub handbrake: PathBuf,
    pub sensitive_locations: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            exiftool: PathBuf::from("exiftool"),
            handbrake: PathBuf::from("HandBrakeCLI"),
            sensitive_locations: default_sensitive_locations_path(),
        }
    }
}

impl ToolConfig {
    /// Build from optional overrides; anything not given keeps its default.
    pub fn from_overrides(
        exiftool: Option<PathBuf>,
        handbrake: Option<PathBuf>,
        sensitive_locations: Option<PathBuf>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            exiftool: exiftool.unwrap_or(defaults.exiftool),
            handbrake: handbrake.unwrap_or(defaults.handbrake),
            sensitive_locations: sensitive_locations.unwrap_or(defaults.sensitive_locations),
        }
    }
}

/// `<config dir>/mediaimport/sensitive-locations.json`, or the working directory when the
/// platform has no config dir.
pub fn default_sensitive_locations_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("mediaimport"))
        .unwrap_or_default()
        .join(SENSITIVE_LOCATIONS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let config = ToolConfig::from_overrides(
            Some(PathBuf::from("/opt/bin/exiftool")),
            None,
            Some(PathBuf::from("/tmp/s.json")),
        );
        assert_eq!(config.exiftool, PathBuf::from("/opt/bin/exiftool"));
        assert_eq!(config.handbrake, PathBuf::from("HandBrakeCLI"));
        assert_eq!(config.sensitive_locations, PathBuf::from("/tmp/s.json"));
    }

    #[test]
    fn test_default_locations_file_name() {
        assert!(default_sensitive_locations_path().ends_with(SENSITIVE_LOCATIONS_FILE));
    }
}
