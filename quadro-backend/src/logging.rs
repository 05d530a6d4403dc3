/// Logger setup for the backend binary.
///
/// `RUST_LOG` overrides the default `info` filter, e.g.
/// `RUST_LOG=quadro_core=debug` to see every move phase.
use env_logger::Env;
use log::SetLoggerError;

pub fn init() -> Result<(), SetLoggerError> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init()
}
