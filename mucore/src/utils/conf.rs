use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    magic::ENV_CONFIG_PATH,
    utils::error::{MuError, MuResult},
};

/// Immutable configuration of a link invocation.
///
/// Built once from defaults, an optional TOML file and the command line, then
/// passed by reference to every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// Number of worker threads used by parallel stages.
    pub workers: usize,

    /// Path of the real linker.
    pub linker: String,

    /// Flags forwarded to the real linker, in order.
    pub linker_flags: Vec<String>,

    /// Command turning a mutated module into an object file. `{input}` and
    /// `{output}` are replaced by the module and object paths. When unset, the
    /// module text is embedded as-is into the object.
    pub compile_command: Option<Vec<String>>,

    pub read_timeout_ms: u64,
    pub compile_timeout_ms: u64,
    pub link_timeout_ms: u64,

    /// Enables debug diagnostics.
    pub debug: bool,

    /// Mutators and mutator groups. Empty selects the default group.
    pub mutators: Vec<String>,

    /// Only mutate code whose source path contains one of these substrings.
    pub include_paths: Vec<String>,

    /// Never mutate code whose source path contains one of these substrings.
    pub exclude_paths: Vec<String>,

    /// Skip functions and instructions without debug information.
    pub debug_info_filter: bool,

    /// Keep going when some inputs cannot be extracted or loaded.
    pub allow_partial_extraction: bool,

    /// Fail when the invocation produces no mutant.
    pub expect_mutants: bool,

    /// Directory receiving the text of every mutated module.
    pub dump_ir: Option<PathBuf>,

    /// Scratch directory for compiled objects, defaults to a directory under
    /// the system temporary directory.
    pub work_dir: Option<PathBuf>,

    /// Path of the linked artifact.
    pub output: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            linker: String::new(),
            linker_flags: Vec::new(),
            compile_command: None,
            read_timeout_ms: 5_000,
            compile_timeout_ms: 60_000,
            link_timeout_ms: 60_000,
            debug: false,
            mutators: Vec::new(),
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            debug_info_filter: true,
            allow_partial_extraction: true,
            expect_mutants: true,
            dump_ir: None,
            work_dir: None,
            output: PathBuf::from("a.out"),
        }
    }
}

impl Configuration {
    /// Path of the configuration file given by the environment, if any.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from)
    }

    /// Parse a configuration from TOML text. Missing keys keep their default.
    pub fn from_toml_str(text: &str, file: &str) -> MuResult<Self> {
        toml::from_str(text).map_err(|e| MuError::ConfigParseError {
            source: e,
            file: file.to_string(),
        })
    }

    /// Load a configuration from a TOML file.
    pub fn load_from_toml(path: &Path) -> MuResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Reject configurations no stage can run with.
    pub fn validate(&self) -> MuResult<()> {
        if self.workers == 0 {
            return Err(MuError::InvalidConfiguration(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.linker.trim().is_empty() {
            return Err(MuError::InvalidConfiguration(
                "no linker was provided".to_string(),
            ));
        }
        if let Some(command) = &self.compile_command {
            if command.is_empty() {
                return Err(MuError::InvalidConfiguration(
                    "compile command is empty".to_string(),
                ));
            }
        }
        if [
            self.read_timeout_ms,
            self.compile_timeout_ms,
            self.link_timeout_ms,
        ]
        .contains(&0)
        {
            return Err(MuError::InvalidConfiguration(
                "timeouts must be at least 1ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Configuration {
        Configuration {
            linker: "cc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Configuration::from_toml_str(
            "workers = 3\nlinker = \"ld\"\nmutators = [\"cxx_bitwise\"]\n",
            "mu.toml",
        )
        .unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.linker, "ld");
        assert_eq!(config.mutators, vec!["cxx_bitwise".to_string()]);
        assert_eq!(config.read_timeout_ms, 5_000);
        assert!(config.debug_info_filter);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Configuration::from_toml_str("wokers = 3\n", "mu.toml").unwrap_err();
        assert!(err.is_config_parse_error());
    }

    #[test]
    fn validation() {
        valid().validate().unwrap();

        let err = Configuration {
            workers: 0,
            ..valid()
        }
        .validate()
        .unwrap_err();
        assert!(err.is_invalid_configuration());

        let err = Configuration::default().validate().unwrap_err();
        assert!(err.is_invalid_configuration());

        let err = Configuration {
            compile_command: Some(Vec::new()),
            ..valid()
        }
        .validate()
        .unwrap_err();
        assert!(err.is_invalid_configuration());
    }

    #[test]
    fn toml_round_trip() {
        let config = Configuration {
            dump_ir: Some(PathBuf::from("/tmp/ir")),
            compile_command: Some(vec!["cc".into(), "{input}".into()]),
            ..valid()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(Configuration::from_toml_str(&text, "mu.toml").unwrap(), config);
    }
}
