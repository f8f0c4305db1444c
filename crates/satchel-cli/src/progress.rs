use std::io::{self, IsTerminal, Write};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use satchel_core::store::NameProgress;

/// Capacity of the progress channel; the core drops events on backpressure.
const PROGRESS_CHANNEL_CAP: usize = 256;

/// Spawn the single progress reporter: it redraws one stderr line per event
/// and exits when every sender is gone.
pub(crate) fn spawn_renderer() -> (Sender<NameProgress>, JoinHandle<()>) {
    let (tx, rx) = bounded::<NameProgress>(PROGRESS_CHANNEL_CAP);
    let handle = std::thread::spawn(move || {
        let mut drew = false;
        let interactive = io::stderr().is_terminal();
        for event in rx {
            if !interactive {
                continue;
            }
            eprint!("\r\x1b[2K{}: {:>5.1}%", event.name, event.percent);
            io::stderr().flush().ok();
            drew = true;
        }
        if drew {
            eprintln!();
        }
    });
    (tx, handle)
}
