//! `GpuLayer` mirrors `CpuLayer` (§4.2 Design Note "Polymorphism over
//! layers") but is GPU-resident: it owns shader handles and device buffer
//! handles instead of host arrays. The shader math itself lives in the
//! precompiled `.spv` modules (§6.6); this module only owns the buffers and
//! issues dispatches in the contract order `CpuLayer` also follows —
//! forward, backward, update.

use std::collections::HashMap;

use crate::config::Config;
use crate::error::{Result, RichardError};
use crate::gpu::shaders::{BufferBinding, SpecConstantValue};
use crate::gpu::{BufferHandle, GpuBufferFlags, GpuRuntime, ShaderHandle};
use crate::layers::CpuLayer;
use crate::shape::Shape3;

type SpirvModules = HashMap<String, Vec<u32>>;

fn module_words<'a>(modules: &'a SpirvModules, name: &str) -> Result<&'a [u32]> {
    modules
        .get(name)
        .map(|words| words.as_slice())
        .ok_or_else(|| RichardError::device(format!("missing shader module `{name}`")))
}

struct DenseShaders {
    eval_forward: ShaderHandle,
    train_forward: ShaderHandle,
    backprop_delta: ShaderHandle,
    backprop_input_delta: ShaderHandle,
    update_params: ShaderHandle,
}

fn register_dense_shaders(runtime: &mut GpuRuntime, modules: &SpirvModules, prefix: &str, input_size: u32, size: u32, dropout_rate: f32) -> Result<DenseShaders> {
    let status = BufferBinding { slot: 0, readonly: true };
    let input = BufferBinding { slot: 1, readonly: false };
    let weights = BufferBinding { slot: 2, readonly: false };
    let biases = BufferBinding { slot: 3, readonly: false };
    let output = BufferBinding { slot: 4, readonly: false };
    let output_delta = BufferBinding { slot: 2, readonly: false };
    let grad_weights = BufferBinding { slot: 4, readonly: false };
    let grad_biases = BufferBinding { slot: 5, readonly: false };
    let input_delta = BufferBinding { slot: 3, readonly: false };

    let eval_name = format!("{prefix}_eval_forward");
    let eval_forward = runtime.add_shader(
        &eval_name,
        module_words(modules, &eval_name)?,
        &[status, input.clone(), weights.clone(), biases.clone(), output.clone()],
        &[],
        0,
        [size, 1, 1],
    )?;
    let train_name = format!("{prefix}_train_forward");
    let train_forward = runtime.add_shader(
        &train_name,
        module_words(modules, &train_name)?,
        &[status, input.clone(), weights.clone(), biases.clone(), output],
        &[SpecConstantValue::F32(dropout_rate)],
        0,
        [size, 1, 1],
    )?;
    let delta_name = format!("{prefix}_backprop_delta");
    let backprop_delta = runtime.add_shader(
        &delta_name,
        module_words(modules, &delta_name)?,
        &[status, input, output_delta.clone(), weights.clone(), grad_weights, grad_biases],
        &[],
        0,
        [size, 1, 1],
    )?;
    let input_delta_name = format!("{prefix}_backprop_input_delta");
    let backprop_input_delta = runtime.add_shader(
        &input_delta_name,
        module_words(modules, &input_delta_name)?,
        &[status, output_delta, weights, input_delta],
        &[],
        0,
        [input_size, 1, 1],
    )?;
    let update_name = format!("{prefix}_update_params");
    let update_params = runtime.add_shader(
        &update_name,
        module_words(modules, &update_name)?,
        &[
            BufferBinding { slot: 0, readonly: true },
            BufferBinding { slot: 1, readonly: false },
            BufferBinding { slot: 2, readonly: false },
            BufferBinding { slot: 3, readonly: false },
            BufferBinding { slot: 4, readonly: false },
        ],
        &[],
        4,
        [size * input_size, 1, 1],
    )?;

    Ok(DenseShaders { eval_forward, train_forward, backprop_delta, backprop_input_delta, update_params })
}

pub struct GpuDenseLayer {
    input_size: u32,
    size: u32,
    weights: BufferHandle,
    biases: BufferHandle,
    grad_weights: BufferHandle,
    grad_biases: BufferHandle,
    shaders: DenseShaders,
}

impl GpuDenseLayer {
    /// Registers the five dense shaders and uploads the CPU layer's current
    /// parameters into newly allocated device buffers. `modules` is the
    /// output of `GpuRuntime::load_shader_set`.
    pub fn upload(runtime: &mut GpuRuntime, modules: &SpirvModules, cfg: &Config, input_size: u32, weights: &[f32], biases: &[f32]) -> Result<Self> {
        let size = cfg.get_u32("size")?;
        let dropout_rate = cfg.get_f32_opt("dropoutRate").unwrap_or(0.0);
        let shaders = register_dense_shaders(runtime, modules, "dense", input_size, size, dropout_rate)?;

        let weights_buf = runtime.allocate_buffer((weights.len() * 4) as u64, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
        runtime.submit_buffer_data(weights_buf, weights)?;
        let biases_buf = runtime.allocate_buffer((biases.len() * 4) as u64, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
        runtime.submit_buffer_data(biases_buf, biases)?;
        let grad_weights = runtime.allocate_buffer((weights.len() * 4) as u64, GpuBufferFlags::NONE)?;
        let grad_biases = runtime.allocate_buffer((biases.len() * 4) as u64, GpuBufferFlags::NONE)?;

        Ok(GpuDenseLayer { input_size, size, weights: weights_buf, biases: biases_buf, grad_weights, grad_biases, shaders })
    }

    /// Reads the weights and biases buffers back to host memory, in the
    /// order `upload` wrote them, so a trained GPU run can overwrite its
    /// `DenseLayer` counterpart before `writeToStream` persists it.
    fn download(&self, runtime: &mut GpuRuntime) -> Result<(Vec<f32>, Vec<f32>)> {
        let mut weights = vec![0.0_f32; (self.size * self.input_size) as usize];
        runtime.retrieve_buffer(self.weights, &mut weights)?;
        let mut biases = vec![0.0_f32; self.size as usize];
        runtime.retrieve_buffer(self.biases, &mut biases)?;
        Ok((weights, biases))
    }
}

pub struct GpuOutputLayer {
    input_size: u32,
    size: u32,
    weights: BufferHandle,
    biases: BufferHandle,
    grad_weights: BufferHandle,
    grad_biases: BufferHandle,
    shaders: DenseShaders,
}

impl GpuOutputLayer {
    pub fn upload(runtime: &mut GpuRuntime, modules: &SpirvModules, cfg: &Config, input_size: u32, weights: &[f32], biases: &[f32]) -> Result<Self> {
        let size = cfg.get_u32("size")?;
        let shaders = register_dense_shaders(runtime, modules, "output", input_size, size, 0.0)?;

        let weights_buf = runtime.allocate_buffer((weights.len() * 4) as u64, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
        runtime.submit_buffer_data(weights_buf, weights)?;
        let biases_buf = runtime.allocate_buffer((biases.len() * 4) as u64, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
        runtime.submit_buffer_data(biases_buf, biases)?;
        let grad_weights = runtime.allocate_buffer((weights.len() * 4) as u64, GpuBufferFlags::NONE)?;
        let grad_biases = runtime.allocate_buffer((biases.len() * 4) as u64, GpuBufferFlags::NONE)?;

        Ok(GpuOutputLayer { input_size, size, weights: weights_buf, biases: biases_buf, grad_weights, grad_biases, shaders })
    }

    fn download(&self, runtime: &mut GpuRuntime) -> Result<(Vec<f32>, Vec<f32>)> {
        let mut weights = vec![0.0_f32; (self.size * self.input_size) as usize];
        runtime.retrieve_buffer(self.weights, &mut weights)?;
        let mut biases = vec![0.0_f32; self.size as usize];
        runtime.retrieve_buffer(self.biases, &mut biases)?;
        Ok((weights, biases))
    }
}

struct MaxPoolShaders {
    eval_forward: ShaderHandle,
    train_forward: ShaderHandle,
    backprop: ShaderHandle,
}

pub struct GpuMaxPoolLayer {
    input_len: u32,
    out_w: u32,
    out_h: u32,
    depth: u32,
    mask: BufferHandle,
    shaders: MaxPoolShaders,
}

impl GpuMaxPoolLayer {
    pub fn upload(runtime: &mut GpuRuntime, modules: &SpirvModules, input_shape: Shape3, cfg: &Config) -> Result<Self> {
        let region = cfg.get_int_list("regionSize")?;
        let (region_w, region_h) = (region[0] as u32, region[1] as u32);
        if input_shape.w() % region_w != 0 || input_shape.h() % region_h != 0 {
            return Err(RichardError::shape("maxPooling region size must evenly divide the input shape"));
        }
        let out_w = input_shape.w() / region_w;
        let out_h = input_shape.h() / region_h;
        let depth = input_shape.d();
        let out_len = out_w * out_h * depth;

        let status = BufferBinding { slot: 0, readonly: true };
        let input = BufferBinding { slot: 1, readonly: false };
        let output = BufferBinding { slot: 2, readonly: false };
        let mask_binding = BufferBinding { slot: 2, readonly: false };
        let output_delta = BufferBinding { slot: 1, readonly: false };
        let input_delta = BufferBinding { slot: 3, readonly: false };

        let spec = [SpecConstantValue::U32(region_w), SpecConstantValue::U32(region_h)];
        let eval_forward = runtime.add_shader(
            "max_pooling_eval_forward",
            module_words(modules, "max_pooling_eval_forward")?,
            &[status, input.clone(), output.clone()],
            &spec,
            0,
            [out_w, out_h, depth],
        )?;
        let train_forward = runtime.add_shader(
            "max_pooling_train_forward",
            module_words(modules, "max_pooling_train_forward")?,
            &[status, input, output, mask_binding.clone()],
            &spec,
            0,
            [out_w, out_h, depth],
        )?;
        let backprop = runtime.add_shader(
            "max_pooling_backprop",
            module_words(modules, "max_pooling_backprop")?,
            &[status, output_delta, mask_binding, input_delta],
            &spec,
            0,
            [input_shape.w(), input_shape.h(), depth],
        )?;

        let mask = runtime.allocate_buffer((out_len * 4) as u64, GpuBufferFlags::NONE)?;

        Ok(GpuMaxPoolLayer { input_len: input_shape.len() as u32, out_w, out_h, depth, mask, shaders: MaxPoolShaders { eval_forward, train_forward, backprop } })
    }
}

struct ConvShaders {
    eval_forward: ShaderHandle,
    train_forward: ShaderHandle,
    backprop_delta: ShaderHandle,
    backprop_param_deltas: ShaderHandle,
    backprop_input_delta: ShaderHandle,
    update_params: ShaderHandle,
}

/// Registers the six convolutional shaders (§4.2.2, §9 "GpuLayer mirrors
/// CpuLayer"). Backprop is split into three stages rather than dense's two:
/// `backprop_delta` recomputes `Z` from `input`/`kernels`/`biases` and folds
/// in `relu'`, `backprop_param_deltas` accumulates the kernel/bias gradients
/// from that delta, and `backprop_input_delta` convolves it back through the
/// kernels — mirroring `ConvLayer::update_deltas`'s three passes.
#[allow(clippy::too_many_arguments)]
fn register_conv_shaders(
    runtime: &mut GpuRuntime,
    modules: &SpirvModules,
    prefix: &str,
    in_w: u32,
    in_h: u32,
    in_depth: u32,
    out_w: u32,
    out_h: u32,
    depth: u32,
    kernel_w: u32,
    kernel_h: u32,
    dropout_rate: f32,
) -> Result<ConvShaders> {
    let status = BufferBinding { slot: 0, readonly: true };
    let input = BufferBinding { slot: 1, readonly: false };
    let kernels = BufferBinding { slot: 2, readonly: false };
    let biases = BufferBinding { slot: 3, readonly: false };
    let output = BufferBinding { slot: 4, readonly: false };
    let output_delta = BufferBinding { slot: 4, readonly: false };
    let delta_write = BufferBinding { slot: 5, readonly: false };
    let delta_read = BufferBinding { slot: 2, readonly: false };
    let grad_kernels = BufferBinding { slot: 3, readonly: false };
    let grad_biases = BufferBinding { slot: 4, readonly: false };
    let input_delta = BufferBinding { slot: 3, readonly: false };

    let weight_count = depth * kernel_w * kernel_h * in_depth;
    let spatial = [out_w, out_h, depth];

    let eval_name = format!("{prefix}_eval_forward");
    let eval_forward = runtime.add_shader(
        &eval_name,
        module_words(modules, &eval_name)?,
        &[status, input.clone(), kernels.clone(), biases.clone(), output.clone()],
        &[],
        0,
        spatial,
    )?;
    let train_name = format!("{prefix}_train_forward");
    let train_forward = runtime.add_shader(
        &train_name,
        module_words(modules, &train_name)?,
        &[status, input.clone(), kernels.clone(), biases.clone(), output],
        &[SpecConstantValue::F32(dropout_rate)],
        0,
        spatial,
    )?;
    let delta_name = format!("{prefix}_backprop_delta");
    let backprop_delta = runtime.add_shader(
        &delta_name,
        module_words(modules, &delta_name)?,
        &[status, input.clone(), kernels.clone(), biases, output_delta, delta_write],
        &[],
        0,
        spatial,
    )?;
    let param_name = format!("{prefix}_backprop_param_deltas");
    let backprop_param_deltas = runtime.add_shader(
        &param_name,
        module_words(modules, &param_name)?,
        &[status, input, delta_read.clone(), grad_kernels, grad_biases],
        &[],
        0,
        [weight_count, 1, 1],
    )?;
    let input_delta_name = format!("{prefix}_backprop_input_delta");
    let backprop_input_delta = runtime.add_shader(
        &input_delta_name,
        module_words(modules, &input_delta_name)?,
        &[status, delta_read, kernels, input_delta],
        &[],
        0,
        [in_w * in_h * in_depth, 1, 1],
    )?;
    let update_name = format!("{prefix}_update_params");
    let update_params = runtime.add_shader(
        &update_name,
        module_words(modules, &update_name)?,
        &[
            BufferBinding { slot: 0, readonly: true },
            BufferBinding { slot: 1, readonly: false },
            BufferBinding { slot: 2, readonly: false },
            BufferBinding { slot: 3, readonly: false },
            BufferBinding { slot: 4, readonly: false },
        ],
        &[],
        4,
        [weight_count, 1, 1],
    )?;

    Ok(ConvShaders { eval_forward, train_forward, backprop_delta, backprop_param_deltas, backprop_input_delta, update_params })
}

pub struct GpuConvLayer {
    input_shape: Shape3,
    out_w: u32,
    out_h: u32,
    depth: u32,
    kernel_w: u32,
    kernel_h: u32,
    kernels: BufferHandle,
    biases: BufferHandle,
    grad_kernels: BufferHandle,
    grad_biases: BufferHandle,
    /// Persistent scratch buffer for the post-`relu'` delta, reused every
    /// sample the way `GpuMaxPoolLayer::mask` is: safe because the barrier
    /// tracker serializes successive samples' writes to it within the same
    /// mini-batch (§8 "Barrier sufficiency").
    delta: BufferHandle,
    shaders: ConvShaders,
}

impl GpuConvLayer {
    pub fn upload(runtime: &mut GpuRuntime, modules: &SpirvModules, cfg: &Config, input_shape: Shape3, kernels: &[f32], biases: &[f32]) -> Result<Self> {
        let depth = cfg.get_u32("depth")?;
        let kernel_size = cfg.get_int_list("kernelSize")?;
        if kernel_size.len() != 2 {
            return Err(RichardError::config("kernelSize", "expected [W, H]"));
        }
        let (kernel_w, kernel_h) = (kernel_size[0] as u32, kernel_size[1] as u32);
        let dropout_rate = cfg.get_f32("dropoutRate")?;
        let (in_w, in_h, in_depth) = (input_shape.w(), input_shape.h(), input_shape.d());
        if kernel_w > in_w || kernel_h > in_h {
            return Err(RichardError::shape(format!("convolutional kernel {kernel_w}x{kernel_h} is larger than input {in_w}x{in_h}")));
        }
        let out_w = in_w - kernel_w + 1;
        let out_h = in_h - kernel_h + 1;

        let shaders = register_conv_shaders(runtime, modules, "convolutional", in_w, in_h, in_depth, out_w, out_h, depth, kernel_w, kernel_h, dropout_rate)?;

        let kernels_buf = runtime.allocate_buffer((kernels.len() * 4) as u64, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
        runtime.submit_buffer_data(kernels_buf, kernels)?;
        let biases_buf = runtime.allocate_buffer((biases.len() * 4) as u64, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
        runtime.submit_buffer_data(biases_buf, biases)?;
        let grad_kernels = runtime.allocate_buffer((kernels.len() * 4) as u64, GpuBufferFlags::NONE)?;
        let grad_biases = runtime.allocate_buffer((biases.len() * 4) as u64, GpuBufferFlags::NONE)?;
        let delta = runtime.allocate_buffer((out_w * out_h * depth * 4) as u64, GpuBufferFlags::NONE)?;

        Ok(GpuConvLayer { input_shape, out_w, out_h, depth, kernel_w, kernel_h, kernels: kernels_buf, biases: biases_buf, grad_kernels, grad_biases, delta, shaders })
    }

    /// Reads the kernels and per-filter biases buffers back to host memory,
    /// flat in the same `(depth, kernel_w, kernel_h, inputDepth)` and
    /// per-filter order `upload` wrote them in.
    fn download(&self, runtime: &mut GpuRuntime) -> Result<(Vec<f32>, Vec<f32>)> {
        let kernel_count = (self.depth * self.kernel_w * self.kernel_h * self.input_shape.d()) as usize;
        let mut kernels = vec![0.0_f32; kernel_count];
        runtime.retrieve_buffer(self.kernels, &mut kernels)?;
        let mut biases = vec![0.0_f32; self.depth as usize];
        runtime.retrieve_buffer(self.biases, &mut biases)?;
        Ok((kernels, biases))
    }
}

pub enum GpuLayer {
    Dense(GpuDenseLayer),
    Conv(GpuConvLayer),
    Output(GpuOutputLayer),
    MaxPool(GpuMaxPoolLayer),
}

impl GpuLayer {
    pub fn output_shape(&self) -> Shape3 {
        match self {
            GpuLayer::Dense(l) => Shape3::vector(l.size),
            GpuLayer::Conv(l) => Shape3::new(l.out_w, l.out_h, l.depth),
            GpuLayer::Output(l) => Shape3::vector(l.size),
            GpuLayer::MaxPool(l) => Shape3::new(l.out_w, l.out_h, l.depth),
        }
    }

    fn input_len(&self) -> u32 {
        match self {
            GpuLayer::Dense(l) => l.input_size,
            GpuLayer::Conv(l) => l.input_shape.len() as u32,
            GpuLayer::Output(l) => l.input_size,
            GpuLayer::MaxPool(l) => l.input_len,
        }
    }

    fn output_len(&self) -> u32 {
        self.output_shape().len() as u32
    }

    /// Dispatches the forward pass, reading `input` and writing a
    /// freshly-allocated output buffer. `status` carries `{epoch,
    /// sampleIndex}` (§6.6) as the shared `StatusBuffer` uniform.
    pub fn train_forward(&self, runtime: &mut GpuRuntime, status: BufferHandle, input: BufferHandle) -> Result<BufferHandle> {
        let output = runtime.allocate_buffer((self.output_len() * 4) as u64, GpuBufferFlags::NONE)?;
        match self {
            GpuLayer::Dense(l) => runtime.queue_shader(l.shaders.train_forward, &[(status, false), (input, false), (l.weights, false), (l.biases, false), (output, true)], None)?,
            GpuLayer::Conv(l) => runtime.queue_shader(l.shaders.train_forward, &[(status, false), (input, false), (l.kernels, false), (l.biases, false), (output, true)], None)?,
            GpuLayer::Output(l) => runtime.queue_shader(l.shaders.train_forward, &[(status, false), (input, false), (l.weights, false), (l.biases, false), (output, true)], None)?,
            GpuLayer::MaxPool(l) => runtime.queue_shader(l.shaders.train_forward, &[(status, false), (input, false), (output, true), (l.mask, true)], None)?,
        }
        Ok(output)
    }

    pub fn eval_forward(&self, runtime: &mut GpuRuntime, status: BufferHandle, input: BufferHandle) -> Result<BufferHandle> {
        let output = runtime.allocate_buffer((self.output_len() * 4) as u64, GpuBufferFlags::NONE)?;
        match self {
            GpuLayer::Dense(l) => runtime.queue_shader(l.shaders.eval_forward, &[(status, false), (input, false), (l.weights, false), (l.biases, false), (output, true)], None)?,
            GpuLayer::Conv(l) => runtime.queue_shader(l.shaders.eval_forward, &[(status, false), (input, false), (l.kernels, false), (l.biases, false), (output, true)], None)?,
            GpuLayer::Output(l) => runtime.queue_shader(l.shaders.eval_forward, &[(status, false), (input, false), (l.weights, false), (l.biases, false), (output, true)], None)?,
            GpuLayer::MaxPool(l) => runtime.queue_shader(l.shaders.eval_forward, &[(status, false), (input, false), (output, true)], None)?,
        }
        Ok(output)
    }

    /// Accumulates this layer's parameter gradients (where it has any) and
    /// returns the delta to propagate to the predecessor.
    pub fn update_deltas(&self, runtime: &mut GpuRuntime, status: BufferHandle, input: BufferHandle, output_delta: BufferHandle) -> Result<BufferHandle> {
        let input_delta = runtime.allocate_buffer((self.input_len() * 4) as u64, GpuBufferFlags::NONE)?;
        match self {
            GpuLayer::Dense(l) => {
                runtime.queue_shader(l.shaders.backprop_delta, &[(status, false), (input, false), (output_delta, false), (l.weights, false), (l.grad_weights, true), (l.grad_biases, true)], None)?;
                runtime.queue_shader(l.shaders.backprop_input_delta, &[(status, false), (output_delta, false), (l.weights, false), (input_delta, true)], None)?;
            }
            GpuLayer::Conv(l) => {
                runtime.queue_shader(
                    l.shaders.backprop_delta,
                    &[(status, false), (input, false), (l.kernels, false), (l.biases, false), (output_delta, false), (l.delta, true)],
                    None,
                )?;
                runtime.queue_shader(
                    l.shaders.backprop_param_deltas,
                    &[(status, false), (input, false), (l.delta, false), (l.grad_kernels, true), (l.grad_biases, true)],
                    None,
                )?;
                runtime.queue_shader(l.shaders.backprop_input_delta, &[(status, false), (l.delta, false), (l.kernels, false), (input_delta, true)], None)?;
            }
            GpuLayer::Output(l) => {
                runtime.queue_shader(l.shaders.backprop_delta, &[(status, false), (input, false), (output_delta, false), (l.weights, false), (l.grad_weights, true), (l.grad_biases, true)], None)?;
                runtime.queue_shader(l.shaders.backprop_input_delta, &[(status, false), (output_delta, false), (l.weights, false), (input_delta, true)], None)?;
            }
            GpuLayer::MaxPool(l) => {
                runtime.queue_shader(l.shaders.backprop, &[(status, false), (output_delta, false), (l.mask, false), (input_delta, true)], None)?;
            }
        }
        Ok(input_delta)
    }

    /// Applies accumulated gradients, scaled by `learn_rate *
    /// learn_rate_decay^epoch` inside the shader via the `epoch` push
    /// constant, then zeros the accumulators (§8 "Gradient accumulation
    /// zeroing"). No-op for max-pooling, which has no parameters.
    pub fn update_params(&self, runtime: &mut GpuRuntime, status: BufferHandle, epoch: u32) -> Result<()> {
        let push = epoch.to_le_bytes();
        match self {
            GpuLayer::Dense(l) => runtime.queue_shader(l.shaders.update_params, &[(status, false), (l.weights, true), (l.biases, true), (l.grad_weights, true), (l.grad_biases, true)], Some(&push)),
            GpuLayer::Conv(l) => runtime.queue_shader(l.shaders.update_params, &[(status, false), (l.kernels, true), (l.biases, true), (l.grad_kernels, true), (l.grad_biases, true)], Some(&push)),
            GpuLayer::Output(l) => runtime.queue_shader(l.shaders.update_params, &[(status, false), (l.weights, true), (l.biases, true), (l.grad_weights, true), (l.grad_biases, true)], Some(&push)),
            GpuLayer::MaxPool(_) => Ok(()),
        }
    }

    /// Copies this layer's trained parameters back onto its CPU-resident
    /// counterpart (§4.4: "the GPU path retrieves parameter buffers back to
    /// host copies so that writeToStream can persist them"). `cpu_layer`
    /// must be the same layer `GpuNetwork::upload` built this `GpuLayer`
    /// from — variant mismatch is a programmer error, not a runtime one.
    pub fn download_into(&self, runtime: &mut GpuRuntime, cpu_layer: &mut CpuLayer) -> Result<()> {
        match (self, cpu_layer) {
            (GpuLayer::Dense(gpu), CpuLayer::Dense(cpu)) => {
                let (weights, biases) = gpu.download(runtime)?;
                cpu.weights.as_mut_slice().copy_from_slice(&weights);
                cpu.biases.as_mut_slice().copy_from_slice(&biases);
                Ok(())
            }
            (GpuLayer::Output(gpu), CpuLayer::Output(cpu)) => {
                let (weights, biases) = gpu.download(runtime)?;
                cpu.weights.as_mut_slice().copy_from_slice(&weights);
                cpu.biases.as_mut_slice().copy_from_slice(&biases);
                Ok(())
            }
            (GpuLayer::Conv(gpu), CpuLayer::Conv(cpu)) => {
                let (kernels, biases) = gpu.download(runtime)?;
                let kernel_len = gpu.kernel_w as usize * gpu.kernel_h as usize * gpu.input_shape.d() as usize;
                for (filter, (kernel_chunk, &bias)) in cpu.filters.iter_mut().zip(kernels.chunks(kernel_len).zip(biases.iter())) {
                    filter.kernel.as_mut_slice().copy_from_slice(kernel_chunk);
                    filter.bias = bias;
                }
                Ok(())
            }
            (GpuLayer::MaxPool(_), CpuLayer::MaxPool(_)) => Ok(()),
            _ => Err(RichardError::device("GPU/CPU layer sequence mismatch during parameter download")),
        }
    }
}
