//! Staged dataflow used by both ingestion passes.
//!
//! A pass has three stages: a serial-in-order reader, a parallel transform,
//! and a serial-in-order aggregator. Buffers are tagged with a sequence
//! number when they leave the reader; the aggregator holds out-of-order
//! results back until their predecessors have been consumed, so downstream
//! containers always observe input order regardless of worker scheduling.
//! Bounded channels keep roughly `tokens` buffers in flight, which is where
//! back-pressure on the reader comes from.

use anyhow::Result;
use crossbeam::channel;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation checked at stage boundaries.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub workers: usize,
    /// Buffers in flight; the sweet spot is about 1.5x the worker count.
    pub tokens: usize,
}

impl PipelineConfig {
    pub fn for_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            tokens: (workers * 3 / 2).max(2),
        }
    }
}

/// Run one pass. `read` pushes buffers through its callback (serial, in
/// order), `work` transforms buffers on the worker pool (any order), and
/// `sink` consumes results serially in input order.
pub fn run<B, P, R, W, S>(
    config: PipelineConfig,
    cancel: &CancelToken,
    read: R,
    work: W,
    mut sink: S,
) -> Result<()>
where
    B: Send,
    P: Send,
    R: FnOnce(&mut dyn FnMut(B)) -> Result<()> + Send,
    W: Fn(B) -> P + Sync,
    S: FnMut(P) -> Result<()>,
{
    let (task_tx, task_rx) = channel::bounded::<(u64, B)>(config.tokens);
    let (result_tx, result_rx) = channel::bounded::<(u64, P)>(config.tokens);

    crossbeam::scope(|scope| -> Result<()> {
        let reader_cancel = cancel.clone();
        let reader = scope.spawn(move |_| -> Result<()> {
            let mut seq = 0u64;
            let mut emit = |buffer: B| {
                if reader_cancel.is_cancelled() {
                    // Treat cancellation as end-of-stream: drop the buffer
                    // and let the remaining in-flight work drain.
                    return;
                }
                if task_tx.send((seq, buffer)).is_ok() {
                    seq += 1;
                }
            };
            read(&mut emit)
        });

        let work = &work;
        for _ in 0..config.workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move |_| {
                for (seq, buffer) in task_rx {
                    if result_tx.send((seq, work(buffer))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        let mut pending: FxHashMap<u64, P> = FxHashMap::default();
        let mut next_seq = 0u64;
        for (seq, parsed) in result_rx {
            pending.insert(seq, parsed);
            while let Some(ready) = pending.remove(&next_seq) {
                sink(ready)?;
                next_seq += 1;
            }
        }

        reader
            .join()
            .expect("pipeline reader thread panicked")?;
        Ok(())
    })
    .expect("pipeline worker thread panicked")
}
