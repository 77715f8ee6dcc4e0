//! Collision-free file names.
//!
//! Names follow `<prefix>_<label>GiB_<timestamp>.bin`. The timestamp is a
//! microsecond Unix time taken from a [`Stamper`], which never hands out the
//! same value twice within a process even when the wall clock stalls or steps
//! backwards.

use portable_atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Extension of every generated file.
pub const FILE_EXTENSION: &str = "bin";

/// Strictly increasing microsecond timestamps.
#[derive(Debug, Default)]
pub struct Stamper {
    last: AtomicU64,
}

impl Stamper {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Returns `max(now, previous + 1)`.
    pub fn next_stamp(&self) -> u64 {
        let now = now_micros();
        let prev = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(prev + 1)
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
}

/// Builds the file name for a job.
pub fn file_name(prefix: &str, label: &str, stamp: u64) -> String {
    format!("{prefix}_{label}GiB_{stamp}.{FILE_EXTENSION}")
}

/// Hidden name a job writes under until its file is complete.
///
/// The leading dot keeps in-progress files out of listings; see
/// [`is_generated_name`].
pub fn staging_name(file_name: &str) -> String {
    format!(".{file_name}.partial")
}

/// Returns `true` if `name` looks like a file this service produces and is
/// safe to expose (no path separators, no hidden files).
pub fn is_generated_name(name: &str) -> bool {
    !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && name
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ext == FILE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn stamps_strictly_increase() {
        let stamper = Stamper::new();
        let mut last = 0;
        for _ in 0..10_000 {
            let stamp = stamper.next_stamp();
            assert!(stamp > last);
            last = stamp;
        }
    }

    #[test]
    fn stamps_are_unique_across_threads() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 1000;

        let stamper = Arc::new(Stamper::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let stamper = Arc::clone(&stamper);
                std::thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| stamper.next_stamp())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::with_capacity(THREADS * PER_THREAD);
        for handle in handles {
            for stamp in handle.join().unwrap() {
                assert!(seen.insert(stamp), "duplicate stamp {stamp}");
            }
        }
    }

    #[test]
    fn name_layout() {
        assert_eq!(
            file_name("zerofill", "5", 1_700_000_000_000_000),
            "zerofill_5GiB_1700000000000000.bin"
        );
        assert_eq!(file_name("big", "0.5", 7), "big_0.5GiB_7.bin");
    }

    #[test]
    fn recognizes_generated_names() {
        assert!(is_generated_name("zerofill_1GiB_1.bin"));
        assert!(!is_generated_name(".hidden.bin"));
        assert!(!is_generated_name("notes.txt"));
        assert!(!is_generated_name("../x.bin"));
        assert!(!is_generated_name(".bin"));
    }

    #[test]
    fn staging_names_are_never_listed() {
        let name = file_name("zerofill", "1", 42);
        let staging = staging_name(&name);
        assert_eq!(staging, ".zerofill_1GiB_42.bin.partial");
        assert!(is_generated_name(&name));
        assert!(!is_generated_name(&staging));
    }
}
