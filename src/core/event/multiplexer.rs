use crate::common::error::Result;
use crate::core::event::event::EventTarget;
use crate::core::event::job::{Job, JobOutcome};
use crate::core::event::poller::{PollEntry, Poller};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Registration table contract consumed by sockets.
pub trait Multiplexer: Send + Sync {
    /// Register `job` for `target`, replacing any existing registration.
    fn add_socket(&self, target: EventTarget, job: Box<dyn Job>);

    /// Drop the registration for `target`, if any.
    fn remove_socket(&self, target: EventTarget);
}

struct Entry {
    // `None` while the job is running on the poll thread
    job: Option<Box<dyn Job>>,
    generation: u64,
}

#[derive(Default)]
struct Table {
    entries: HashMap<EventTarget, Entry>,
    next_generation: u64,
}

/// Polls every registered job's handle and runs the jobs that are ready.
pub struct SocketMultiplexer {
    table: Mutex<Table>,
    poller: Poller,
    poll_timeout: Duration,
    running: AtomicBool,
}

impl SocketMultiplexer {
    pub fn new(poll_timeout: Duration) -> Result<Self> {
        Ok(Self {
            table: Mutex::new(Table::default()),
            poller: Poller::new()?,
            poll_timeout,
            running: AtomicBool::new(true),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_registered(&self, target: EventTarget) -> bool {
        self.lock().entries.contains_key(&target)
    }

    /// One poll-and-dispatch pass. Returns the number of jobs run.
    pub fn run_once(&self) -> Result<usize> {
        let (polled, mut entries): (Vec<(EventTarget, u64)>, Vec<PollEntry>) = {
            let table = self.lock();
            table
                .entries
                .iter()
                .filter_map(|(target, entry)| {
                    let job = entry.job.as_ref()?;
                    let interest = job.interest();
                    if interest.is_empty() {
                        return None;
                    }
                    Some(((*target, entry.generation), PollEntry::new(job.fd(), interest)))
                })
                .unzip()
        };

        let timeout_ms = self.poll_timeout.as_millis().min(i32::MAX as u128) as i32;
        if self.poller.wait(&mut entries, timeout_ms)? == 0 {
            return Ok(0);
        }

        let mut dispatched = 0;
        for ((target, generation), entry) in polled.into_iter().zip(entries) {
            if entry.readiness.is_empty() {
                continue;
            }

            let mut job = {
                let mut table = self.lock();
                match table.entries.get_mut(&target) {
                    Some(slot) if slot.generation == generation => match slot.job.take() {
                        Some(job) => job,
                        None => continue,
                    },
                    _ => continue,
                }
            };

            trace!(token = target.as_raw(), readiness = ?entry.readiness, "running job");
            let outcome = job.run(entry.readiness);
            dispatched += 1;

            let mut table = self.lock();
            let stopped = match table.entries.get_mut(&target) {
                Some(slot) if slot.generation == generation && slot.job.is_none() => match outcome {
                    JobOutcome::Continue => {
                        slot.job = Some(job);
                        false
                    }
                    JobOutcome::Rearm(next) => {
                        slot.job = Some(next);
                        false
                    }
                    JobOutcome::Stop => true,
                },
                // replaced or removed while the job ran; its outcome is stale
                _ => false,
            };
            if stopped {
                table.entries.remove(&target);
                debug!(token = target.as_raw(), "job stopped, registration dropped");
            }
        }
        Ok(dispatched)
    }

    /// Run the poll loop on its own thread until `shutdown`.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let mux = Arc::clone(self);
        thread::spawn(move || {
            debug!("multiplexer thread started");
            while mux.running.load(Ordering::Acquire) {
                if let Err(e) = mux.run_once() {
                    error!(error = %e, "multiplexer poll failed");
                    thread::sleep(mux.poll_timeout);
                }
            }
            debug!("multiplexer thread stopped");
        })
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        self.poller.wake();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Multiplexer for SocketMultiplexer {
    fn add_socket(&self, target: EventTarget, job: Box<dyn Job>) {
        {
            let mut table = self.lock();
            let generation = table.next_generation;
            table.next_generation += 1;
            table.entries.insert(
                target,
                Entry {
                    job: Some(job),
                    generation,
                },
            );
        }
        self.poller.wake();
    }

    fn remove_socket(&self, target: EventTarget) {
        let removed = self.lock().entries.remove(&target).is_some();
        if removed {
            self.poller.wake();
        }
    }
}
