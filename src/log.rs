/*!

Internal logging. The crate logs through the `log` facade; nothing is emitted
unless the embedding program installs a logger. [`init_logging`] installs a
plain console logger via log4rs for programs that don't bring their own.
Logging never affects simulation semantics.

*/

pub use log::{LevelFilter, debug, error, info, trace, warn};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};

/// Installs a console logger at the given level. Safe to call more than once;
/// only the first call installs a logger.
pub fn init_logging(level: LevelFilter) {
    let stdout = ConsoleAppender::builder().build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level));

    match config {
        Ok(config) => {
            // Err means a global logger is already installed; keep it.
            let _ = log4rs::init_config(config);
        }
        Err(error) => {
            eprintln!("failed to build logging configuration: {error}");
        }
    }
}
