/// Agent configuration loaded from TOML
#[allow(clippy::module_inception)]
pub mod config;

pub use config::{
    Config, EnclosureConfig, FruKind, OutputConfig, SelConfig, SystemInformation,
};
