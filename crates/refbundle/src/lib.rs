pub mod app;
pub mod domain;
pub mod infra;

pub use app::bundler::{Bundle, BundleError, bundle};
pub use app::mapping::{Location, Mapping};
pub use domain::errors::{BundlingError, Failure, FailureKind};
pub use infra::config::Config;
pub use infra::workspace::{FsWorkspace, Workspace};

pub fn init() {
    infra::logging::init();
}
