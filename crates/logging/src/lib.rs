//! helpers for logging.

/// Log to stderr, with the level taken from `RUST_LOG` (defaulting to `info`).
///
/// If called multiple times in the same process, only applies once.
pub fn log_to_stderr() {
    log_to_stderr_with_filter(None);
}

/// Log to stderr with an explicit env_logger filter such as `canvas_cache=debug`.  `None` falls back to `RUST_LOG`.
///
/// Only the first call in a process has any effect, whichever of the two functions it is.
pub fn log_to_stderr_with_filter(filter: Option<&str>) {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        if let Some(f) = filter {
            builder.parse_filters(f);
        }

        builder
            .format(|buf, record| {
                use std::io::Write;

                let now = time::OffsetDateTime::now_utc();

                writeln!(
                    buf,
                    "{} {} time={} target={}",
                    record.level(),
                    record.args(),
                    now,
                    record.target()
                )
            })
            // Another logger may already be installed.
            .try_init()
            .ok();
    });
}
