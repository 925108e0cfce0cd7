//! CLI command implementations

pub mod clear;
pub mod config;
pub mod get;
pub mod list;
pub mod pins;
pub mod preload;
pub mod warm;

pub use clear::execute as clear;
pub use config::execute as config;
pub use get::execute as get;
pub use list::execute as list;
pub use pins::execute as pins;
pub use preload::execute as preload;
pub use warm::execute as warm;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while waiting on an install
pub(crate) fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
