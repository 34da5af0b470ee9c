use std::path::PathBuf;

use thiserror::Error;

use crate::dsl::error::CompileFailure;

/// Crate-level failure. Compiler problems arrive as a rendered-on-demand
/// [`CompileFailure`]; everything else is I/O around the compiler.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}", .failure.render(.file))]
    Compile { file: String, failure: CompileFailure },

    #[error("image segment '{name}' at {addr:#08x} overlaps '{other}'")]
    ImageOverlap {
        name: String,
        addr: u32,
        other: String,
    },

    #[error("image segment '{name}' does not fit below 4 GiB")]
    ImageTooLarge { name: String },
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }
}
