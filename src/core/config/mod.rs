pub mod env;
pub mod paths;
pub mod settings;

pub use env::{EnvConfig, ProxySettings};
pub use paths::AppPaths;
pub use settings::{ServerSettings, SplitHistoryPolicy};
