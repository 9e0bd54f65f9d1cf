mod config;
mod info;
mod jobs;
mod restore;
mod vaults;

pub use config::config;
pub use info::info;
pub use jobs::jobs;
pub use restore::restore;
pub use vaults::vaults;
