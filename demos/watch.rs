use std::env;
use std::io::{self, Read};
use std::path::PathBuf;

use log::{error, info};

use dirwatch::{Notification, Session, SessionConfig, WatchOptions};

fn main() {
    pretty_env_logger::init();
    let mut args = env::args().skip(1);
    let path = args.next().map_or_else(|| PathBuf::from("./"), PathBuf::from);
    let use_generic = args.any(|arg| arg == "--poll");

    let mut session = Session::with_config(
        &SessionConfig::default()
            .with_generic_backend(use_generic)
            .with_follow_symlinks(true),
    );
    let options = WatchOptions::new()
        .recursive(true)
        .on_any(|ev| {
            info!("{}", Notification::from_event(ev));
            Ok(())
        })
        .on_error(|failure| {
            error!("{} callback for {} failed: {}", failure.action, failure.watch_id, failure.error);
            Ok(())
        });
    match session.add_watch(&path, options) {
        Ok(id) => info!("Watching {:?} as {}", path, id),
        Err(e) => {
            error!("Unable to watch {:?}: {} ({})", path, e, dirwatch::last_error_message());
            return;
        }
    }
    session.start();

    // Run until stdin is closed.
    if let Err(e) = io::stdin().read_to_end(&mut Vec::new()) {
        error!("Unable to read stdin: {}", e);
    }
}
