//! Subscriber setup for binaries embedding the dispatch queue.
//!
//! The library only emits `tracing` events; call [`init`] once at startup if
//! nothing else installs a subscriber.

use tracing_subscriber::EnvFilter;

use crate::BoxError;

/// Install a global fmt subscriber honouring `RUST_LOG` (default `info`)
pub fn init(json: bool) -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let _ = init(false);
        assert!(init(false).is_err());
    }
}
