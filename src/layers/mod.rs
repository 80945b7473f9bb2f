//! The layer engine: a closed set of layer kinds dispatched through an
//! exhaustive match rather than dynamic dispatch (§9, "Polymorphism over
//! layers"). Each variant implements the shared forward/backward/update
//! contract of spec §4.2 via the free functions below.

pub mod conv;
pub mod dense;
pub mod maxpool;
pub mod output;

use crate::config::Config;
use crate::error::{Result, RichardError};
use crate::shape::Shape3;

pub use conv::ConvLayer;
pub use dense::DenseLayer;
pub use maxpool::MaxPoolLayer;
pub use output::OutputLayer;

/// One layer in the network's declared topology, CPU-resident.
#[derive(Debug)]
pub enum CpuLayer {
    Dense(DenseLayer),
    Conv(ConvLayer),
    MaxPool(MaxPoolLayer),
    Output(OutputLayer),
}

impl CpuLayer {
    pub fn output_shape(&self) -> Shape3 {
        match self {
            CpuLayer::Dense(l) => Shape3::vector(l.output_size() as u32),
            CpuLayer::Conv(l) => l.output_shape(),
            CpuLayer::MaxPool(l) => l.output_shape(),
            CpuLayer::Output(l) => Shape3::vector(l.output_size() as u32),
        }
    }

    pub fn train_forward(&mut self, inputs: &[f32]) -> Vec<f32> {
        match self {
            CpuLayer::Dense(l) => l.train_forward(inputs),
            CpuLayer::Conv(l) => l.train_forward(inputs),
            CpuLayer::MaxPool(l) => l.train_forward(inputs),
            CpuLayer::Output(l) => l.train_forward(inputs),
        }
    }

    pub fn eval_forward(&self, inputs: &[f32]) -> Vec<f32> {
        match self {
            CpuLayer::Dense(l) => l.eval_forward(inputs),
            CpuLayer::Conv(l) => l.eval_forward(inputs),
            CpuLayer::MaxPool(l) => l.eval_forward(inputs),
            CpuLayer::Output(l) => l.eval_forward(inputs),
        }
    }

    /// `outputDelta` is either the successor's `inputDelta`, or — for the
    /// output layer only — the expected one-hot label vector `y` (§4.3).
    pub fn update_deltas(&mut self, inputs: &[f32], output_delta: &[f32]) -> Vec<f32> {
        match self {
            CpuLayer::Dense(l) => l.update_deltas(inputs, output_delta),
            CpuLayer::Conv(l) => l.update_deltas(inputs, output_delta),
            CpuLayer::MaxPool(l) => l.update_deltas(inputs, output_delta),
            CpuLayer::Output(l) => l.update_deltas(inputs, output_delta),
        }
    }

    pub fn update_params(&mut self, epoch: u32) {
        match self {
            CpuLayer::Dense(l) => l.update_params(epoch),
            CpuLayer::Conv(l) => l.update_params(epoch),
            CpuLayer::MaxPool(l) => l.update_params(epoch),
            CpuLayer::Output(l) => l.update_params(epoch),
        }
    }

    pub fn write_to_stream(&self, sink: &mut impl std::io::Write) -> std::io::Result<()> {
        match self {
            CpuLayer::Dense(l) => l.write_to_stream(sink),
            CpuLayer::Conv(l) => l.write_to_stream(sink),
            CpuLayer::MaxPool(l) => l.write_to_stream(sink),
            CpuLayer::Output(l) => l.write_to_stream(sink),
        }
    }

    pub fn read_from_stream(&mut self, src: &mut impl std::io::Read) -> std::io::Result<()> {
        match self {
            CpuLayer::Dense(l) => l.read_from_stream(src),
            CpuLayer::Conv(l) => l.read_from_stream(src),
            CpuLayer::MaxPool(l) => l.read_from_stream(src),
            CpuLayer::Output(l) => l.read_from_stream(src),
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, CpuLayer::Output(_))
    }
}

/// Builds one hidden layer from its config object, given the shape produced
/// by the previous layer (or the network's input shape, for the first).
pub fn hidden_layer_from_config(cfg: &Config, input_shape: Shape3) -> Result<CpuLayer> {
    let kind = cfg.get_str("type")?;
    match kind {
        "dense" => {
            let input_size = input_shape.len();
            Ok(CpuLayer::Dense(DenseLayer::from_config(cfg, input_size)?))
        }
        "convolutional" => Ok(CpuLayer::Conv(ConvLayer::from_config(cfg, input_shape)?)),
        "maxPooling" => Ok(CpuLayer::MaxPool(MaxPoolLayer::from_config(cfg, input_shape)?)),
        other => Err(RichardError::config("type", format!("unknown hidden layer type `{other}`"))),
    }
}

/// Builds the trailing output layer from its config object.
pub fn output_layer_from_config(cfg: &Config, input_shape: Shape3) -> Result<CpuLayer> {
    let kind = cfg.get_str("type")?;
    if kind != "output" {
        return Err(RichardError::config("type", "the final layer must have type `output`"));
    }
    let input_size = input_shape.len();
    Ok(CpuLayer::Output(OutputLayer::from_config(cfg, input_size)?))
}
