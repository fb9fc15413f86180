pub mod config;
pub mod nearby;
pub mod simulate;

pub use config::ConfigCommand;
pub use nearby::NearbyCommand;
pub use simulate::SimulateCommand;

use hark::memory::Viewer;

use crate::error::CliResult;
use crate::output::parse_uuid;

/// Build the listener identity from `--user` and `--friend` flags
pub fn viewer_from_args(user: Option<&str>, friends: &[String]) -> CliResult<Viewer> {
    let mut viewer = match user {
        Some(id) => Viewer::new(parse_uuid(id)?),
        None => Viewer::anonymous(),
    };
    for friend in friends {
        viewer.friend_ids.insert(parse_uuid(friend)?);
    }
    Ok(viewer)
}
