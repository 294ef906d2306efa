use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Initializes stderr logging. `RUST_LOG` overrides the default level.
pub fn init_logging() {
    Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("bluest", LevelFilter::Warn)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .init();
}
