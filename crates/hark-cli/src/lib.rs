pub mod commands;
pub mod error;
pub mod output;

pub use commands::{ConfigCommand, NearbyCommand, SimulateCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_distance, format_timestamp, truncate_string};
