//! Console progress reporting

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::ProgressSink;

/// Progress bar sink for interactive runs
///
/// Counter updates sit behind one lock; the bar itself is internally
/// thread-safe but the posted-chunk counter drives the position and must
/// not race.
pub struct ConsoleProgress {
    bar: ProgressBar,
    state: Mutex<ProgressState>,
}

struct ProgressState {
    posted_chunks: u64,
    posted_bytes: u64,
}

impl ConsoleProgress {
    /// Create a bar for `total_chunks` chunks of `total_bytes` raw bytes
    pub fn new(file_name: &str, total_chunks: u64, total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n[{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
                .expect("valid progress bar template")
                .progress_chars("#>-"),
        );
        bar.set_message(format!("Posting {} ({} articles)", file_name, total_chunks));

        Self {
            bar,
            state: Mutex::new(ProgressState {
                posted_chunks: 0,
                posted_bytes: 0,
            }),
        }
    }

    /// Total bytes reported so far
    pub fn posted_bytes(&self) -> u64 {
        self.state.lock().expect("progress lock").posted_bytes
    }
}

impl ProgressSink for ConsoleProgress {
    fn chunk_posted(&self, _chunk_number: u32, bytes: u64) {
        let mut state = self.state.lock().expect("progress lock");
        state.posted_chunks += 1;
        state.posted_bytes += bytes;
        self.bar.set_position(state.posted_bytes);
    }

    fn completed(&self) {
        let state = self.state.lock().expect("progress lock");
        self.bar
            .finish_with_message(format!("Posted {} articles", state.posted_chunks));
    }
}

/// Counting sink for tests and quiet runs
#[derive(Default)]
pub struct CountingProgress {
    state: Mutex<(u64, u64)>,
}

impl CountingProgress {
    /// (chunks, bytes) reported so far
    pub fn totals(&self) -> (u64, u64) {
        *self.state.lock().expect("progress lock")
    }
}

impl ProgressSink for CountingProgress {
    fn chunk_posted(&self, _chunk_number: u32, bytes: u64) {
        let mut state = self.state.lock().expect("progress lock");
        state.0 += 1;
        state.1 += bytes;
    }
}
