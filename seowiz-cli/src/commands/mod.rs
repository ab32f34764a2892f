pub mod config;
pub mod run;
pub mod status;
pub mod steps;

pub use config::cmd_config;
pub use run::{cmd_restart, cmd_retry, cmd_run, cmd_skip, RunTarget};
pub use status::cmd_status;
pub use steps::cmd_steps;
