use std::io::Read;

use crossbeam_channel::Sender;

use crate::store::NameProgress;

/// A reader that reports transfer progress as a percentage.
///
/// Sends are non-blocking: with no listener keeping up, updates are dropped
/// rather than stalling the transfer.
pub struct ProgressReader<R> {
    inner: R,
    read: u64,
    total: u64,
    name: String,
    updates: Sender<NameProgress>,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, total: u64, name: &str, updates: Sender<NameProgress>) -> Self {
        Self {
            inner,
            read: 0,
            total,
            name: name.to_string(),
            updates,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if self.total > 0 {
            let percent = self.read as f64 / self.total as f64 * 100.0;
            let _ = self.updates.try_send(NameProgress {
                name: self.name.clone(),
                percent,
            });
        }
        Ok(n)
    }
}
