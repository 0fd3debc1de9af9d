//! Two-phase task execution, sequential or fanned out over a worker
//! pool, with a checkpoint hook between slices.
//!
//! A task splits into an I/O half that can run anywhere and a
//! bookkeeping half that has to run in order. The runner takes a batch
//! of tasks, runs the I/O halves (concurrently, if asked), then runs
//! the bookkeeping halves in submission order on the calling thread,
//! a slice at a time, calling `checkpoint` after each slice. That keeps
//! shared state single-threaded while the store and the disk get all
//! the parallelism.

use std::sync::{Mutex, mpsc};
use std::thread;

use anyhow::{Context, Result};

use crate::store::Store;

/// A unit of work with a concurrent phase and a serialised phase.
pub trait Task<C>: Send {
    /// Do the I/O. May run on any worker, against that worker's own
    /// store handle. Stash results in `self`.
    fn transfer(&mut self, store: &mut dyn Store) -> Result<()>;

    /// Fold the results into shared state. Runs on the submitting
    /// thread, in submission order.
    fn absorb(&mut self, cx: &mut C) -> Result<()>;
}

/// How a batch of tasks gets executed.
#[derive(Debug, Clone, Copy, Default)]
pub enum Runner {
    #[default]
    Sequential,
    Parallel {
        workers: usize,
    },
}

pub const DEFAULT_WORKERS: usize = 10;

/// How many tasks run between checkpoint callbacks.
pub const DEFAULT_CHECKPOINT_FREQ: usize = 32;

type BoxedTask<C> = Box<dyn Task<C>>;

pub fn run_tasks<C>(
    runner: Runner,
    store: &mut dyn Store,
    tasks: Vec<BoxedTask<C>>,
    checkpoint_freq: usize,
    cx: &mut C,
    checkpoint: &mut dyn FnMut(&mut C, &mut dyn Store) -> Result<()>,
) -> Result<()> {
    assert!(checkpoint_freq > 0, "checkpoint frequency of zero");
    match runner {
        Runner::Sequential => run_sequentially(store, tasks, checkpoint_freq, cx, checkpoint),
        Runner::Parallel { workers } => {
            run_in_pool(workers, store, tasks, checkpoint_freq, cx, checkpoint)
        }
    }
}

fn run_sequentially<C>(
    store: &mut dyn Store,
    mut tasks: Vec<BoxedTask<C>>,
    checkpoint_freq: usize,
    cx: &mut C,
    checkpoint: &mut dyn FnMut(&mut C, &mut dyn Store) -> Result<()>,
) -> Result<()> {
    for slice in tasks.chunks_mut(checkpoint_freq) {
        for task in slice.iter_mut() {
            task.transfer(store)?;
        }
        for task in slice.iter_mut() {
            task.absorb(cx)?;
        }
        checkpoint(cx, store)?;
    }
    Ok(())
}

fn run_in_pool<C>(
    workers: usize,
    store: &mut dyn Store,
    tasks: Vec<BoxedTask<C>>,
    checkpoint_freq: usize,
    cx: &mut C,
    checkpoint: &mut dyn FnMut(&mut C, &mut dyn Store) -> Result<()>,
) -> Result<()> {
    assert!(workers > 0, "parallel runner with zero workers");

    // Tasks ride out with their submission index and ride back with
    // the transfer result; the index restores submission order,
    // since completion order is whatever it is.
    let (task_tx, task_rx) = mpsc::sync_channel::<(usize, BoxedTask<C>)>(workers * 2);
    let task_rx = Mutex::new(task_rx);
    let (done_tx, done_rx) = mpsc::channel::<(usize, BoxedTask<C>, Result<()>)>();

    // Each worker gets its own store handle;
    // nobody said the real one is safe to share.
    let mut worker_stores = Vec::with_capacity(workers);
    for _ in 0..workers {
        worker_stores.push(store.try_clone()?);
    }

    thread::scope(|s| -> Result<()> {
        for mut worker_store in worker_stores {
            let task_rx = &task_rx;
            let done_tx = done_tx.clone();
            s.spawn(move || {
                loop {
                    let next = task_rx.lock().unwrap().recv();
                    let (i, mut task) = match next {
                        Ok(t) => t,
                        Err(_) => break, // Dispatcher hung up; we're done.
                    };
                    let res = task.transfer(&mut *worker_store);
                    if done_tx.send((i, task, res)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);

        let total = tasks.len();
        let mut pending = tasks.into_iter().enumerate();
        let mut absorbed = 0;
        while absorbed < total {
            let slice_len = checkpoint_freq.min(total - absorbed);
            for _ in 0..slice_len {
                let (i, task) = pending.next().expect("task count mismatch");
                task_tx
                    .send((i, task))
                    .ok()
                    .context("The worker pool hung up early")?;
            }

            // Drain the whole slice before absorbing anything.
            let mut slice: Vec<Option<(BoxedTask<C>, Result<()>)>> =
                (0..slice_len).map(|_| None).collect();
            for _ in 0..slice_len {
                let (i, task, res) = done_rx
                    .recv()
                    .ok()
                    .context("The worker pool hung up early")?;
                slice[i - absorbed] = Some((task, res));
            }
            for entry in slice {
                let (mut task, res) = entry.expect("a task went missing");
                res?;
                task.absorb(cx)?;
            }
            checkpoint(cx, store)?;
            absorbed += slice_len;
        }
        drop(task_tx);
        Ok(())
    })
}
