use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ── Compiler switches ────────────────────────────────────────────

/// Switches that change what the compiler accepts or emits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Synthesize a stub state for transitions to undeclared names instead of
    /// failing. Development only: every synthesis is reported as a warning.
    pub allow_implicit: bool,
    /// Remove NOPs that only rejoin parallel text alternatives.
    pub cull_nops: bool,
    /// Silence the warning for wrapped frames holding a single word.
    pub suppress_single_word_warning: bool,
}

// ── Image placement ──────────────────────────────────────────────

/// Byte offsets of each table inside the flash image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Placement {
    pub text_pool_addr: u32,
    pub action_table_addr: u32,
    pub state_table_addr: u32,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            text_pool_addr: 0x09_0000,
            action_table_addr: 0x08_0000,
            state_table_addr: 0x07_0000,
        }
    }
}

// ── Outputs ──────────────────────────────────────────────────────

/// Where to write each artifact. Every output is independent and optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    /// Flat binary flash image.
    pub image: Option<PathBuf>,
    /// C symbol header; `-` means stdout.
    pub symbols: Option<PathBuf>,
    /// GraphViz state graph.
    pub state_dot: Option<PathBuf>,
    /// GraphViz action graph.
    pub action_dot: Option<PathBuf>,
}

/// Everything one build needs besides the sheet itself. Can be kept in a
/// JSON file next to the sheet and overridden from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub compile: CompileOptions,
    pub placement: Placement,
    pub outputs: OutputPaths,
}

/// Load a build config. Missing keys take their defaults.
pub fn load_config(path: &Path) -> Result<BuildConfig, AppError> {
    let content = std::fs::read_to_string(path).map_err(|source| AppError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| AppError::Config {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.json");
        let json = serde_json::json!({
            "compile": { "cull_nops": true },
            "placement": { "text_pool_addr": 4096 },
            "outputs": { "symbols": "-" }
        });
        std::fs::write(&path, serde_json::to_string_pretty(&json).unwrap()).unwrap();

        let config = load_config(&path).expect("should load");
        assert!(config.compile.cull_nops);
        assert!(!config.compile.allow_implicit);
        assert_eq!(config.placement.text_pool_addr, 4096);
        assert_eq!(config.placement.action_table_addr, Placement::default().action_table_addr);
        assert_eq!(config.outputs.symbols, Some(PathBuf::from("-")));
        assert_eq!(config.outputs.image, None);
    }

    #[test]
    fn bad_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(AppError::Config { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(load_config(&missing), Err(AppError::Io { .. })));
    }
}
