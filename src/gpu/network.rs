//! Mirrors `Network`'s ordered layer sequence onto the GPU (§4.4 GPU
//! training path, §9 "GpuLayer mirrors CpuLayer"): same forward / backward /
//! update contract, buffer handles standing in for host arrays. Built from
//! an existing `Network`'s current parameters so a GPU run can start from
//! exactly the weights a CPU run would (§8 "CPU ≡ GPU within tolerance").

use std::collections::HashMap;

use crate::config::Config;
use crate::error::Result;
use crate::gpu::layer::{GpuConvLayer, GpuDenseLayer, GpuLayer, GpuMaxPoolLayer, GpuOutputLayer};
use crate::gpu::shaders::{BufferBinding, COMPUTE_COSTS_SHADER};
use crate::gpu::{BufferHandle, GpuBufferFlags, GpuRuntime, ShaderHandle};
use crate::layers::CpuLayer;
use crate::network::Network;
use crate::shape::Shape3;

type SpirvModules = HashMap<String, Vec<u32>>;

/// `{epoch, sampleIndex}` (§6.6), the uniform every shader reads to pick its
/// dropout seed and, for convolutional/max-pooling layers, its write-back
/// offset. Encoded as two `f32` lanes since `GpuRuntime::submit_buffer_data`
/// only moves `f32` — both counters stay well inside the 24-bit integer
/// range a `f32` represents exactly.
pub struct StatusBuffer {
    handle: BufferHandle,
}

impl StatusBuffer {
    fn allocate(runtime: &mut GpuRuntime) -> Result<Self> {
        let handle = runtime.allocate_buffer(8, GpuBufferFlags::SHADER_READONLY)?;
        Ok(StatusBuffer { handle })
    }

    pub fn set(&self, runtime: &mut GpuRuntime, epoch: u32, sample_index: u32) -> Result<()> {
        runtime.submit_buffer_data(self.handle, &[epoch as f32, sample_index as f32])
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }
}

/// The GPU-resident analogue of `Network`: an ordered `GpuLayer` stack plus
/// the shared `StatusBuffer` and the per-output-index cost accumulator the
/// `compute_costs` shader reduces into.
pub struct GpuNetwork {
    input_shape: Shape3,
    layers: Vec<GpuLayer>,
    status: StatusBuffer,
    cost_accum: BufferHandle,
    compute_costs: ShaderHandle,
    output_size: u32,
}

impl GpuNetwork {
    /// Uploads `network`'s current parameters and builds the matching
    /// GPU-resident layer sequence. `cfg` must be the same top-level config
    /// `network` was built from — a layer's shape-independent settings
    /// (kernel size, dropout rate, learn rate, ...) aren't recoverable from
    /// its uploaded buffers alone.
    pub fn upload(runtime: &mut GpuRuntime, modules: &SpirvModules, cfg: &Config, network: &Network) -> Result<Self> {
        let hidden_cfgs = cfg.get_child_list("hiddenLayers")?;
        let output_cfg = cfg.get_child("outputLayer")?;

        let mut shape = network.input_shape();
        let mut layers = Vec::with_capacity(network.layers().len());
        for (i, cpu_layer) in network.layers().iter().enumerate() {
            let layer_cfg = hidden_cfgs.get(i).unwrap_or(output_cfg);
            let gpu_layer = upload_layer(runtime, modules, layer_cfg, shape, cpu_layer)?;
            shape = gpu_layer.output_shape();
            layers.push(gpu_layer);
        }

        let output_size = shape.len() as u32;
        let status = StatusBuffer::allocate(runtime)?;
        let cost_accum = runtime.allocate_buffer((output_size * 4) as u64, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
        let compute_costs = register_compute_costs(runtime, modules, output_size)?;

        Ok(GpuNetwork { input_shape: network.input_shape(), layers, status, cost_accum, compute_costs, output_size })
    }

    pub fn input_shape(&self) -> Shape3 {
        self.input_shape
    }

    pub fn output_size(&self) -> u32 {
        self.output_size
    }

    pub fn status(&self) -> &StatusBuffer {
        &self.status
    }

    /// Zeros the cost accumulator; called once per epoch (§4.4 step 2), not
    /// per mini-batch, so the epoch average matches the CPU path's.
    pub fn reset_cost_accum(&self, runtime: &mut GpuRuntime) -> Result<()> {
        runtime.submit_buffer_data(self.cost_accum, &vec![0.0_f32; self.output_size as usize])
    }

    /// Sums and retrieves the cost accumulator. Must be called after a
    /// `flush_queue`, never against a still-recording queue (§9 "GPU command
    /// buffer ownership").
    pub fn read_cost_accum(&self, runtime: &mut GpuRuntime) -> Result<f32> {
        let mut buf = vec![0.0_f32; self.output_size as usize];
        runtime.retrieve_buffer(self.cost_accum, &mut buf)?;
        Ok(buf.into_iter().sum())
    }

    /// Threads `input` through every layer, recording the forward dispatch
    /// chain. Returns every layer's input buffer (so `train_backward` can
    /// hand each layer back the same input its contract expects) together
    /// with the final activations — mirroring `Network::train_forward`'s
    /// `layer_inputs` bookkeeping. The caller owns every returned buffer and
    /// must free them once the recorded work has been flushed.
    pub fn train_forward(&self, runtime: &mut GpuRuntime, input: BufferHandle) -> Result<(Vec<BufferHandle>, BufferHandle)> {
        let status = self.status.handle();
        let mut layer_inputs = Vec::with_capacity(self.layers.len());
        let mut current = input;
        for layer in &self.layers {
            layer_inputs.push(current);
            current = layer.train_forward(runtime, status, current)?;
        }
        Ok((layer_inputs, current))
    }

    /// Accumulates this sample's squared error into the cost buffer, then
    /// walks the layers last-to-first exactly as `Network::train_backward`
    /// does. `label` is the expected one-hot vector; `predicted` is the
    /// final layer's activations from the matching `train_forward` call.
    /// Returns every freshly-allocated delta buffer the caller must free
    /// once flushed.
    pub fn train_backward(&self, runtime: &mut GpuRuntime, layer_inputs: &[BufferHandle], predicted: BufferHandle, label: BufferHandle) -> Result<Vec<BufferHandle>> {
        let status = self.status.handle();
        runtime.queue_shader(self.compute_costs, &[(status, false), (predicted, false), (label, false), (self.cost_accum, true)], None)?;

        let mut scratch = Vec::new();
        let mut delta = label;
        for i in (0..self.layers.len()).rev() {
            let input_delta = self.layers[i].update_deltas(runtime, status, layer_inputs[i], delta)?;
            scratch.push(input_delta);
            delta = input_delta;
        }
        Ok(scratch)
    }

    /// Dispatches `updateParams` on every layer, in declaration order.
    pub fn update_params(&self, runtime: &mut GpuRuntime, epoch: u32) -> Result<()> {
        let status = self.status.handle();
        for layer in &self.layers {
            layer.update_params(runtime, status, epoch)?;
        }
        Ok(())
    }

    /// Evaluation-only forward chain for the classifier's test pass — no
    /// dropout, no recorded intermediates.
    pub fn eval_forward(&self, runtime: &mut GpuRuntime, input: BufferHandle) -> Result<BufferHandle> {
        let status = self.status.handle();
        let mut current = input;
        for layer in &self.layers {
            current = layer.eval_forward(runtime, status, current)?;
        }
        Ok(current)
    }

    /// Retrieves every layer's trained parameters back to `network`'s
    /// CPU-resident layers, in the same declaration order `upload` walked
    /// (§4.4: the GPU path's final step before `writeToStream`). `network`
    /// must be the same instance `upload` was built from.
    pub fn download_into(&self, runtime: &mut GpuRuntime, network: &mut Network) -> Result<()> {
        for (gpu_layer, cpu_layer) in self.layers.iter().zip(network.layers_mut().iter_mut()) {
            gpu_layer.download_into(runtime, cpu_layer)?;
        }
        Ok(())
    }
}

fn upload_layer(runtime: &mut GpuRuntime, modules: &SpirvModules, layer_cfg: &Config, shape: Shape3, cpu_layer: &CpuLayer) -> Result<GpuLayer> {
    Ok(match cpu_layer {
        CpuLayer::Dense(l) => GpuLayer::Dense(GpuDenseLayer::upload(runtime, modules, layer_cfg, shape.len() as u32, l.weights.as_slice(), l.biases.as_slice())?),
        CpuLayer::Conv(l) => {
            let kernels: Vec<f32> = l.filters.iter().flat_map(|f| f.kernel.as_slice().iter().copied()).collect();
            let biases: Vec<f32> = l.filters.iter().map(|f| f.bias).collect();
            GpuLayer::Conv(GpuConvLayer::upload(runtime, modules, layer_cfg, shape, &kernels, &biases)?)
        }
        CpuLayer::MaxPool(_) => GpuLayer::MaxPool(GpuMaxPoolLayer::upload(runtime, modules, shape, layer_cfg)?),
        CpuLayer::Output(l) => GpuLayer::Output(GpuOutputLayer::upload(runtime, modules, layer_cfg, shape.len() as u32, l.weights.as_slice(), l.biases.as_slice())?),
    })
}

fn register_compute_costs(runtime: &mut GpuRuntime, modules: &SpirvModules, output_size: u32) -> Result<ShaderHandle> {
    let status = BufferBinding { slot: 0, readonly: true };
    let predicted = BufferBinding { slot: 1, readonly: false };
    let label = BufferBinding { slot: 2, readonly: false };
    let cost_accum = BufferBinding { slot: 3, readonly: false };
    let words = modules
        .get(COMPUTE_COSTS_SHADER)
        .ok_or_else(|| crate::error::RichardError::device(format!("missing shader module `{COMPUTE_COSTS_SHADER}`")))?;
    runtime.add_shader(COMPUTE_COSTS_SHADER, words, &[status, predicted, label, cost_accum], &[], 0, [output_size, 1, 1])
}
