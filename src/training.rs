//! Epoch/batch/mini-batch training loop with double-buffered sample
//! prefetch, gradient accumulation policy, and abort/event signalling
//! (§4.4, §5).
//!
//! Concurrency model: exactly two threads during a run — this one, and a
//! worker spawned per prefetch that owns the data set handle for the
//! duration of its single `load_samples` call, then hands it back over a
//! rendezvous channel together with the result. No more than one
//! outstanding fetch is ever in flight (§9, "Coroutine-style prefetch").

use std::sync::mpsc;
use std::thread;

use crate::error::{Result, RichardError};
use crate::events::{Event, EventBus};
use crate::io::{DataDetails, LabelledDataSet, Sample};
use crate::network::Network;

pub(crate) type BoxedDataSet = Box<dyn LabelledDataSet>;
pub(crate) type PrefetchResult = (BoxedDataSet, Result<Vec<Sample>>);

/// Spawns the one worker thread allowed to be in flight at a time (§9
/// "Coroutine-style prefetch"), shared by the CPU and GPU training drivers.
pub(crate) fn spawn_prefetch(mut data: BoxedDataSet, count: usize) -> mpsc::Receiver<PrefetchResult> {
    let (tx, rx) = mpsc::sync_channel(0);
    thread::spawn(move || {
        let result = data.load_samples(count);
        // The receiver may have been dropped (e.g. the driver bailed out on
        // an earlier error); a failed send just means there is nobody left
        // to hand the loader back to.
        let _ = tx.send((data, result));
    });
    rx
}

/// Runs the training loop to completion (or until `network.abort()` is
/// observed), raising `EpochStarted`/`SampleProcessed`/`EpochCompleted` on
/// `events` as it goes.
pub fn train(
    network: &mut Network,
    mut data: BoxedDataSet,
    details: &DataDetails,
    events: &EventBus,
) -> Result<()> {
    let hp = network.hyperparams();
    let fetch_size = data.fetch_size();
    if fetch_size == 0 || fetch_size % hp.mini_batch_size as usize != 0 {
        return Err(RichardError::Precondition {
            message: format!(
                "data loader fetch size {fetch_size} is not a multiple of miniBatchSize {}",
                hp.mini_batch_size
            ),
        });
    }

    for epoch in 0..hp.epochs {
        events.raise(Event::EpochStarted { epoch, total: hp.epochs });
        if network.is_aborted() {
            break;
        }

        let mut cost_accum = 0.0_f32;
        let mut samples_processed: u32 = 0;
        let mut pending_rx = Some(spawn_prefetch(data, fetch_size));

        loop {
            let rx = pending_rx.take().expect("a prefetch is always outstanding mid-epoch");
            let (returned_data, fetch_result) = rx
                .recv()
                .map_err(|_| RichardError::Precondition { message: "prefetch worker dropped unexpectedly".into() })?;
            let batch = fetch_result?;
            let exhausted = batch.is_empty();

            // §4.4 step 4: the next fetch is issued immediately on receipt of
            // this one, before this batch is processed, so ingestion of the
            // following batch overlaps with compute on the current one.
            let will_continue = !exhausted && samples_processed < hp.batch_size && !network.is_aborted();
            let mut reclaimed_data = if will_continue {
                let remaining = (hp.batch_size - samples_processed) as usize;
                let next_fetch = remaining.min(fetch_size).max(1);
                pending_rx = Some(spawn_prefetch(returned_data, next_fetch));
                None
            } else {
                Some(returned_data)
            };

            for mini_batch in batch.chunks(hp.mini_batch_size as usize) {
                for sample in mini_batch {
                    let label = details.one_hot(&sample.label).ok_or_else(|| RichardError::Precondition {
                        message: format!("sample label `{}` has no one-hot mapping", sample.label),
                    })?;
                    let a = network.train_forward(&sample.data);
                    cost_accum += Network::cost(&label, &a);
                    network.train_backward(&label);
                    samples_processed += 1;

                    if samples_processed % hp.mini_batch_size == 0 || samples_processed == hp.batch_size {
                        network.update_params(epoch);
                    }
                    if network.is_aborted() {
                        break;
                    }
                }
                events.raise(Event::SampleProcessed { index: samples_processed, total: hp.batch_size });
                if network.is_aborted() {
                    break;
                }
            }

            // Whenever this epoch's inner loop is about to stop, reclaim the
            // data set handle from wherever it currently lives, so
            // `seek_to_beginning` below always has somewhere to land.
            if !will_continue {
                data = reclaimed_data.take().expect("data set handle reclaimed on stop");
                break;
            }
        }

        let avg_cost = if samples_processed > 0 { cost_accum / samples_processed as f32 } else { 0.0 };
        events.raise(Event::EpochCompleted { epoch, total: hp.epochs, cost: avg_cost });

        // §4.4 step 9: unconditional, every epoch, exhausted or not, so the
        // next epoch (if any) starts back at the beginning of the data set.
        data.seek_to_beginning();

        if network.is_aborted() {
            break;
        }
    }

    Ok(())
}
