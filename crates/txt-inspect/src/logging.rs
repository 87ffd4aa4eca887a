//! Logger setup for the inspector.
//!
//! Decoder and inspector records go to stderr through `env_logger`. Debug
//! output is enabled by `--verbose` or by `TXT_INSPECT_DEBUG=1|true`;
//! otherwise only warnings are shown.

use std::sync::OnceLock;

use log::LevelFilter;

const DEBUG_ENV: &str = "TXT_INSPECT_DEBUG";

static INIT: OnceLock<LevelFilter> = OnceLock::new();

/// Installs the logger once and returns the level that is in effect.
///
/// Later calls keep the first level. If another logger already owns the
/// `log` facade, a warning goes to stderr and that logger stays in place.
pub fn init(verbose: bool) -> LevelFilter {
    *INIT.get_or_init(|| {
        let level = level_for(verbose, debug_env_value().as_deref());
        if let Err(error) = builder(level).try_init() {
            eprintln!("warning: keeping the existing logger: {error}");
        }
        level
    })
}

fn builder(level: LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_module("txt_decode", level)
        .filter_module("txt_inspect", level)
        .format_timestamp_millis();
    builder
}

fn debug_env_value() -> Option<String> {
    std::env::var(DEBUG_ENV).ok()
}

fn level_for(verbose: bool, env_value: Option<&str>) -> LevelFilter {
    let env_debug =
        env_value.is_some_and(|value| value == "1" || value.eq_ignore_ascii_case("true"));
    if verbose || env_debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

#[cfg(test)]
mod tests {
    use log::LevelFilter;

    use super::{builder, init, level_for};

    #[test]
    fn verbose_flag_or_env_enables_debug() {
        assert_eq!(level_for(true, None), LevelFilter::Debug);
        assert_eq!(level_for(false, Some("1")), LevelFilter::Debug);
        assert_eq!(level_for(false, Some("TRUE")), LevelFilter::Debug);
    }

    #[test]
    fn default_level_is_warn() {
        assert_eq!(level_for(false, None), LevelFilter::Warn);
        assert_eq!(level_for(false, Some("0")), LevelFilter::Warn);
        assert_eq!(level_for(false, Some("yes")), LevelFilter::Warn);
    }

    #[test]
    fn init_is_idempotent() {
        let first = init(true);
        assert_eq!(init(false), first);
    }

    #[test]
    fn second_installation_is_reported() {
        init(false);
        assert!(builder(LevelFilter::Debug).try_init().is_err());
    }
}
