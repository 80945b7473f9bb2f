//! Builds and owns the ordered layer sequence; forward chain, reverse
//! backprop chain, and parameter-update fan-out (§4.3).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, RichardError};
use crate::layers::{hidden_layer_from_config, output_layer_from_config, CpuLayer};
use crate::shape::Shape3;

/// `epochs`/`batchSize`/`miniBatchSize` triple (§3). `batchSize` must be a
/// multiple of `miniBatchSize`; the training driver checks this before the
/// first sample is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hyperparams {
    pub epochs: u32,
    pub batch_size: u32,
    pub mini_batch_size: u32,
}

impl Hyperparams {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let epochs = cfg.get_u32("epochs")?;
        let batch_size = cfg.get_u32("batchSize")?;
        let mini_batch_size = cfg.get_u32("miniBatchSize")?;
        if mini_batch_size == 0 || batch_size % mini_batch_size != 0 {
            return Err(RichardError::config(
                "hyperparams",
                "batchSize must be a positive multiple of miniBatchSize",
            ));
        }
        Ok(Hyperparams { epochs, batch_size, mini_batch_size })
    }
}

pub struct Network {
    input_shape: Shape3,
    layers: Vec<CpuLayer>,
    hyperparams: Hyperparams,
    abort: Arc<AtomicBool>,
    /// Per-layer inputs recorded by the most recent `train_forward` call, so
    /// `train_backward` can hand each layer back the same `inputs` its
    /// contract's `updateDeltas` expects, without re-deriving them.
    layer_inputs: Vec<Vec<f32>>,
}

impl Network {
    /// Fresh construction: every layer randomizes its own parameters.
    pub fn fresh(cfg: &Config, input_shape: Shape3) -> Result<Self> {
        let layers = build_layers(cfg, input_shape)?;
        let hyperparams = Hyperparams::from_config(cfg.get_child("hyperparams")?)?;
        Ok(Network {
            input_shape,
            layers,
            hyperparams,
            abort: Arc::new(AtomicBool::new(false)),
            layer_inputs: Vec::new(),
        })
    }

    /// Restored construction: builds the same topology, then overwrites each
    /// layer's parameters by consuming `reader` in declaration order — the
    /// same order `write_params` produced them in.
    pub fn restore(cfg: &Config, input_shape: Shape3, reader: &mut impl std::io::Read) -> Result<Self> {
        let mut net = Self::fresh(cfg, input_shape)?;
        for layer in &mut net.layers {
            layer
                .read_from_stream(reader)
                .map_err(|e| RichardError::io("<parameter stream>", e))?;
        }
        Ok(net)
    }

    pub fn input_shape(&self) -> Shape3 {
        self.input_shape
    }

    pub fn hyperparams(&self) -> Hyperparams {
        self.hyperparams
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().expect("network has at least one layer").output_shape().len()
    }

    /// The current layer sequence, in declaration order. Used to mirror a
    /// network's live parameters onto a GPU-resident copy (§9 "GpuLayer
    /// mirrors CpuLayer") so a CPU and GPU run can start from identical
    /// weights.
    pub fn layers(&self) -> &[CpuLayer] {
        &self.layers
    }

    /// Mutable access to the layer sequence, for overwriting parameters in
    /// place — used by the GPU training path to copy trained buffers back
    /// onto their CPU-resident counterparts once training completes.
    pub fn layers_mut(&mut self) -> &mut [CpuLayer] {
        &mut self.layers
    }

    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Threads `x` through every layer in declaration order, recording each
    /// layer's input for the following `train_backward` call. Returns the
    /// final layer's activations.
    pub fn train_forward(&mut self, x: &[f32]) -> Vec<f32> {
        self.layer_inputs.clear();
        let mut current = x.to_vec();
        for layer in &mut self.layers {
            self.layer_inputs.push(current.clone());
            current = layer.train_forward(&current);
        }
        current
    }

    /// No-state evaluation chain: identical to `train_forward` but without
    /// dropout or stored intermediates, and without touching `layer_inputs`.
    pub fn eval_forward(&self, x: &[f32]) -> Vec<f32> {
        let mut current = x.to_vec();
        for layer in &self.layers {
            current = layer.eval_forward(&current);
        }
        current
    }

    /// `½·‖y - a‖²`, the quadratic cost the output layer's delta is derived
    /// from.
    pub fn cost(y: &[f32], a: &[f32]) -> f32 {
        y.iter().zip(a).map(|(yi, ai)| (yi - ai).powi(2)).sum::<f32>() * 0.5
    }

    /// Walks the layers last-to-first. The output layer receives `y`
    /// directly as its `outputDelta`; every earlier layer receives its
    /// successor's `inputDelta`. Must be called immediately after the
    /// `train_forward` whose `layer_inputs` it consumes.
    pub fn train_backward(&mut self, y: &[f32]) {
        let mut delta = y.to_vec();
        for i in (0..self.layers.len()).rev() {
            let inputs = &self.layer_inputs[i];
            delta = self.layers[i].update_deltas(inputs, &delta);
        }
    }

    /// Calls `updateParams` on every layer, in declaration order (§4.3: at
    /// every mini-batch boundary).
    pub fn update_params(&mut self, epoch: u32) {
        for layer in &mut self.layers {
            layer.update_params(epoch);
        }
    }

    /// Writes every layer's parameters, in declaration order, in the binary
    /// layout of §4.2/§6.1 (biases then weights/kernels; max-pooling layers
    /// contribute nothing).
    pub fn write_params(&self, sink: &mut impl std::io::Write) -> std::io::Result<()> {
        for layer in &self.layers {
            layer.write_to_stream(sink)?;
        }
        Ok(())
    }
}

fn build_layers(cfg: &Config, input_shape: Shape3) -> Result<Vec<CpuLayer>> {
    let hidden_cfgs = cfg.get_child_list("hiddenLayers")?;
    if hidden_cfgs.is_empty() {
        // Open Question (ii): a network with no hidden layers reproduces the
        // source's `m_layers[i-1]` indexing hazard for `i == 0`. Rather than
        // special-case that, a single-layer network is rejected outright.
        return Err(RichardError::config(
            "hiddenLayers",
            "a network needs at least one hidden layer before its output layer",
        ));
    }

    let mut layers = Vec::with_capacity(hidden_cfgs.len() + 1);
    let mut shape = input_shape;
    for (i, layer_cfg) in hidden_cfgs.iter().enumerate() {
        let layer = hidden_layer_from_config(layer_cfg, shape)
            .map_err(|e| annotate_layer_index(e, i))?;
        shape = layer.output_shape();
        layers.push(layer);
    }

    let output_cfg = cfg.get_child("outputLayer")?;
    let output_layer = output_layer_from_config(output_cfg, shape)?;
    layers.push(output_layer);
    Ok(layers)
}

fn annotate_layer_index(err: RichardError, index: usize) -> RichardError {
    match err {
        RichardError::Configuration { key, message } => RichardError::Configuration {
            key: format!("hiddenLayers[{index}].{key}"),
            message,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn xor_config() -> Config {
        let json = r#"{
            "hyperparams": {"epochs": 1, "batchSize": 1, "miniBatchSize": 1},
            "hiddenLayers": [
                {"type": "dense", "size": 4, "learnRate": 0.5, "learnRateDecay": 1.0, "dropoutRate": 0.0}
            ],
            "outputLayer": {"type": "output", "size": 2, "learnRate": 0.5, "learnRateDecay": 1.0}
        }"#;
        parse_config(json).unwrap()
    }

    #[test]
    fn shape_composition_holds_across_layers() {
        let cfg = xor_config();
        let net = Network::fresh(&cfg, Shape3::vector(3)).unwrap();
        assert_eq!(net.output_size(), 2);
    }

    #[test]
    fn rejects_network_with_no_hidden_layers() {
        let json = r#"{
            "hyperparams": {"epochs": 1, "batchSize": 1, "miniBatchSize": 1},
            "hiddenLayers": [],
            "outputLayer": {"type": "output", "size": 2, "learnRate": 0.5, "learnRateDecay": 1.0}
        }"#;
        let cfg = parse_config(json).unwrap();
        assert!(Network::fresh(&cfg, Shape3::vector(3)).is_err());
    }

    #[test]
    fn gradient_accumulation_zeros_after_update() {
        let cfg = xor_config();
        let mut net = Network::fresh(&cfg, Shape3::vector(3)).unwrap();
        let x = vec![0.5, 0.3, 0.7];
        let y = vec![1.0, 0.0];
        let a = net.train_forward(&x);
        let cost_before = Network::cost(&y, &a);
        assert!(cost_before.is_finite());
        net.train_backward(&y);
        net.update_params(0);
        // A second forward/backward pass should accumulate from zero, not
        // from the previous sample's leftover gradient.
        let a2 = net.train_forward(&x);
        net.train_backward(&y);
        net.update_params(0);
        assert!(Network::cost(&y, &a2).is_finite());
    }
}
