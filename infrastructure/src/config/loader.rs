//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// Prefix of environment overrides; `__` separates sections.
const ENV_PREFIX: &str = "HARNESS_";

const PROJECT_FILES: [&str; 2] = ["copilot-harness.toml", ".copilot-harness.toml"];

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `HARNESS_*` environment variables
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./copilot-harness.toml` or `./.copilot-harness.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/copilot-harness/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&Path>) -> Result<FileConfig, Box<figment::Error>> {
        Self::figment(
            Self::global_config_path().as_deref(),
            Self::project_config_path().as_deref(),
            config_path,
        )
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(Box::new)
    }

    /// File sources only, lowest priority first. Missing files are skipped,
    /// except an explicit path, which must exist.
    fn figment(global: Option<&Path>, project: Option<&Path>, explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        for path in [global, project].into_iter().flatten() {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        if let Some(path) = explicit {
            figment = figment.merge(Toml::file_exact(path));
        }
        figment
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// `$XDG_CONFIG_HOME/copilot-harness/config.toml`, falling back to the
    /// platform config directory.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("copilot-harness").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Print the config file locations being used (for debugging)
    pub fn print_config_sources() {
        println!("Configuration sources (in priority order):");
        println!("  [     ] Env:     {}*", ENV_PREFIX);

        if let Some(path) = Self::project_config_path() {
            println!("  [FOUND] Project: {}", path.display());
        } else {
            println!("  [     ] Project: ./{}", PROJECT_FILES.join(" or ./"));
        }

        if let Some(path) = Self::global_config_path() {
            let mark = if path.exists() { "FOUND" } else { "     " };
            println!("  [{}] Global:  {}", mark, path.display());
        }

        println!("  [     ] Default: built-in defaults");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert!(config.session.model.is_none());
        assert!(config.client.cli_url.is_none());
    }

    #[test]
    fn test_global_config_path_names_the_app() {
        if let Some(path) = ConfigLoader::global_config_path() {
            assert!(path.to_string_lossy().contains("copilot-harness"));
        }
    }

    #[test]
    fn test_later_files_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(
            dir.path(),
            "global.toml",
            "[session]\nmodel = \"gpt-5\"\nstreaming = true\n",
        );
        let project = write(dir.path(), "project.toml", "[session]\nmodel = \"gpt-4.1\"\n");

        let config: FileConfig = ConfigLoader::figment(Some(&global), Some(&project), None)
            .extract()
            .unwrap();
        assert_eq!(config.session.model.as_deref(), Some("gpt-4.1"));
        assert!(config.session.streaming);
        assert_eq!(config.session.turn_timeout_seconds, 60);
    }

    #[test]
    fn test_explicit_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let project = write(dir.path(), "project.toml", "[client]\ncli_url = \"localhost:1\"\n");
        let explicit = write(dir.path(), "explicit.toml", "[client]\ncli_url = \"localhost:2\"\n");

        let config: FileConfig = ConfigLoader::figment(None, Some(&project), Some(&explicit))
            .extract()
            .unwrap();
        assert_eq!(config.client.cli_url.as_deref(), Some("localhost:2"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let result: Result<FileConfig, _> =
            ConfigLoader::figment(None, None, Some(&missing)).extract();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_optional_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let config: FileConfig = ConfigLoader::figment(Some(&missing), Some(&missing), None)
            .extract()
            .unwrap();
        assert_eq!(config, FileConfig::default());
    }
}
