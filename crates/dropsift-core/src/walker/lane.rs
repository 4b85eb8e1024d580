/// A replaceable I/O thread for host calls that may never return.
///
/// The walker submits one job at a time and waits on the reply with a
/// timeout so it can keep checking its cancel token. If it gives up on a
/// job, the lane is replaced: the old thread stays parked in the hung call
/// and exits on its own if the call ever returns, because its job queue has
/// been disconnected.
use crossbeam_channel::{Receiver, Sender};
use std::io;
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct ReadLane {
    tx: Sender<Job>,
    generation: u32,
}

impl ReadLane {
    pub fn spawn(generation: u32) -> io::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<Job>(1);
        thread::Builder::new()
            .name("dropsift-io".into())
            .spawn(move || {
                for job in rx.iter() {
                    job();
                }
            })?;
        Ok(Self { tx, generation })
    }

    /// How many lanes came before this one in the current walk.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Queue `job`. The result arrives on the returned receiver; a
    /// disconnect means the job panicked or the lane died.
    pub fn submit<T, F>(&self, job: F) -> Option<Receiver<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded::<T>(1);
        let job: Job = Box::new(move || {
            let _ = reply_tx.send(job());
        });
        self.tx.send(job).ok()?;
        Some(reply_rx)
    }
}
