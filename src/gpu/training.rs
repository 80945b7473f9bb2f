//! GPU-resident counterpart of [`crate::training::train`] (§4.4 step 5): the
//! same epoch/batch/mini-batch structure and double-buffered prefetch, but
//! every forward/backward/update dispatch runs as queued shader work against
//! `GpuNetwork` instead of host arithmetic. Trained parameters are copied
//! back onto the CPU-resident `Network` once the run finishes so
//! `writeToStream` can persist them (§9 "GpuLayer mirrors CpuLayer").

use crate::error::{Result, RichardError};
use crate::events::{Event, EventBus};
use crate::gpu::{GpuBufferFlags, GpuNetwork, GpuRuntime};
use crate::io::{DataDetails, LabelledDataSet};
use crate::network::Network;
use crate::training::{spawn_prefetch, BoxedDataSet};

/// Runs the training loop against `gpu_net`, then downloads its trained
/// parameters onto `network`. `gpu_net` must have been built from `network`
/// by `GpuNetwork::upload`, and `network`'s hyperparameters drive the loop.
pub fn train(
    runtime: &mut GpuRuntime,
    gpu_net: &GpuNetwork,
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

    let input_len = gpu_net.input_shape().len();
    let output_len = gpu_net.output_size() as usize;

    for epoch in 0..hp.epochs {
        events.raise(Event::EpochStarted { epoch, total: hp.epochs });
        if network.is_aborted() {
            break;
        }

        gpu_net.reset_cost_accum(runtime)?;
        let mut samples_processed: u32 = 0;
        let mut pending_rx = Some(spawn_prefetch(data, fetch_size));

        loop {
            let rx = pending_rx.take().expect("a prefetch is always outstanding mid-epoch");
            let (returned_data, fetch_result) = rx
                .recv()
                .map_err(|_| RichardError::Precondition { message: "prefetch worker dropped unexpectedly".into() })?;
            let batch = fetch_result?;
            let exhausted = batch.is_empty();

            // Mirrors the CPU driver's overlap: the next fetch is issued as
            // soon as this batch is in hand, before any of it is dispatched.
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
                let mut mini_batch_buffers: Vec<_> = Vec::new();

                for sample in mini_batch {
                    let label = details.one_hot(&sample.label).ok_or_else(|| RichardError::Precondition {
                        message: format!("sample label `{}` has no one-hot mapping", sample.label),
                    })?;
                    if sample.data.len() != input_len || label.len() != output_len {
                        return Err(RichardError::shape("sample/label length does not match the uploaded network's shape"));
                    }

                    gpu_net.status().set(runtime, epoch, samples_processed)?;

                    let input_buf = runtime.allocate_buffer((input_len * 4) as u64, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
                    runtime.submit_buffer_data(input_buf, &sample.data)?;
                    let label_buf = runtime.allocate_buffer((output_len * 4) as u64, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
                    runtime.submit_buffer_data(label_buf, &label)?;

                    let (layer_inputs, predicted) = gpu_net.train_forward(runtime, input_buf)?;
                    let deltas = gpu_net.train_backward(runtime, &layer_inputs, predicted, label_buf)?;

                    mini_batch_buffers.extend(layer_inputs);
                    mini_batch_buffers.push(predicted);
                    mini_batch_buffers.push(label_buf);
                    mini_batch_buffers.extend(deltas);

                    samples_processed += 1;
                }

                // Every sample's forward/reverse chain in this mini-batch is
                // now recorded against the same command buffer; the update
                // dispatch goes in right behind them, and only then does the
                // whole chain flush (§4.4 step 6/7), matching the CPU path's
                // per-mini-batch `update_params` boundary.
                gpu_net.update_params(runtime, epoch)?;
                runtime.flush_queue()?;
                for buf in mini_batch_buffers {
                    runtime.free_buffer(buf)?;
                }

                events.raise(Event::SampleProcessed { index: samples_processed, total: hp.batch_size });
            }

            if !will_continue {
                data = reclaimed_data.take().expect("data set handle reclaimed on stop");
                break;
            }
        }

        let total_cost = gpu_net.read_cost_accum(runtime)?;
        let avg_cost = if samples_processed > 0 { total_cost / samples_processed as f32 } else { 0.0 };
        events.raise(Event::EpochCompleted { epoch, total: hp.epochs, cost: avg_cost });

        data.seek_to_beginning();

        if network.is_aborted() {
            break;
        }
    }

    gpu_net.download_into(runtime, network)?;
    Ok(())
}
