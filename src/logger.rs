use crate::peer::types::IceCandidate;
use log::{debug, Level, LevelFilter, Log, Metadata, Record};

/// Console backend for the `log` facade, timestamped with local time.
struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        logging_enabled() && metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = chrono::Local::now();
        println!(
            "RUST: [{}] {:<5} {}: {}",
            now.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

fn logging_enabled() -> bool {
    crate::config::LOGGING_ENABLED && crate::config::dev::ENABLE_LOGGING
}

/// Installs the console logger. Safe to call more than once; only the
/// first call (or an already-installed foreign logger) wins.
pub fn init() {
    let level = if logging_enabled() {
        LevelFilter::Debug
    } else {
        LevelFilter::Off
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Trickle-ICE trace line for a candidate crossing the signaling channel.
pub fn dump_candidate(label: &str, peer_id: &str, cand: &IceCandidate) {
    debug!(
        "Trickle {label} peer={peer_id}: candidate={} sdp_mid={:?} sdp_mline_index={}",
        cand.candidate, cand.sdp_mid, cand.sdp_mline_index
    );
}
