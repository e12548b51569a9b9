pub mod clean;
pub mod deploy;

use crate::environment::Environment;
use snaps_cloud::OpenStackCli;
use snaps_deploy::Launcher;
use std::sync::Arc;

fn launcher(env: Environment) -> Launcher {
    let playbook_dir = env.playbook_dir();
    Launcher::new(env.config, Arc::new(OpenStackCli::new())).with_playbook_dir(playbook_dir)
}
