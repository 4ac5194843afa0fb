pub mod ansi;
pub mod clock;
pub(crate) mod docker;
pub(crate) mod git;
pub mod image_name;
pub mod namespace;
pub mod pipeline;
pub(crate) mod process;
pub mod progress;
pub mod registry;
pub mod secret;
pub mod toolchain;
pub(crate) mod version;
pub mod workspace;

pub mod cli;

pub type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
