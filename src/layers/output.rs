//! Output layer: same parameter shape as dense, sigmoid activation, no
//! dropout. `outputDelta` for this layer is the cost derivative `A - y`
//! rather than a chained delta from a successor.

use crate::activations::{sigmoid, sigmoid_prime};
use crate::config::Config;
use crate::error::{Result, RichardError};
use crate::tensor::ops::{mat_transpose_vec_mul, mat_vec_mul, outer_product, vec_add, vec_sub};
use crate::tensor::{gaussian_fill, Matrix, Vector};

const WEIGHT_STD_DEV: f32 = 0.1;

#[derive(Debug)]
pub struct OutputLayer {
    pub(crate) input_size: usize,
    pub(crate) size: usize,
    pub(crate) weights: Matrix<'static>,
    pub(crate) biases: Vector<'static>,
    pub(crate) grad_weights: Matrix<'static>,
    pub(crate) grad_biases: Vector<'static>,
    pub(crate) learn_rate: f32,
    pub(crate) learn_rate_decay: f32,
    last_z: Vec<f32>,
    last_activations: Vec<f32>,
}

impl OutputLayer {
    pub fn output_size(&self) -> usize {
        self.size
    }

    pub fn fresh(input_size: usize, size: usize, learn_rate: f32, learn_rate_decay: f32) -> Self {
        let mut weights = Matrix::zeros(size, input_size);
        gaussian_fill(weights.as_mut_slice(), WEIGHT_STD_DEV);
        OutputLayer {
            input_size,
            size,
            weights,
            biases: Vector::zeros(size),
            grad_weights: Matrix::zeros(size, input_size),
            grad_biases: Vector::zeros(size),
            learn_rate,
            learn_rate_decay,
            last_z: vec![0.0; size],
            last_activations: vec![0.0; size],
        }
    }

    pub fn from_config(cfg: &Config, input_size: usize) -> Result<Self> {
        let size = cfg.get_usize("size")?;
        let learn_rate = cfg.get_f32("learnRate")?;
        let learn_rate_decay = cfg.get_f32("learnRateDecay")?;
        if !(0.0..=1.0).contains(&learn_rate_decay) || learn_rate_decay == 0.0 {
            return Err(RichardError::config("learnRateDecay", "must be in (0, 1]"));
        }
        Ok(Self::fresh(input_size, size, learn_rate, learn_rate_decay))
    }

    /// Returns the activation vector; also the quantity compared against a
    /// label's one-hot vector for argmax-based classification.
    pub fn train_forward(&mut self, inputs: &[f32]) -> Vec<f32> {
        let x = Vector::owned(inputs.to_vec());
        let z = vec_add(&mat_vec_mul(&self.weights, &x), &self.biases);
        self.last_z.copy_from_slice(z.as_slice());
        let activations: Vec<f32> = z.as_slice().iter().map(|v| sigmoid(*v)).collect();
        self.last_activations.copy_from_slice(&activations);
        activations
    }

    pub fn eval_forward(&self, inputs: &[f32]) -> Vec<f32> {
        let x = Vector::owned(inputs.to_vec());
        let z = vec_add(&mat_vec_mul(&self.weights, &x), &self.biases);
        z.as_slice().iter().map(|v| sigmoid(*v)).collect()
    }

    /// `label` is the expected one-hot vector `y`; `δC = A - y`.
    pub fn update_deltas(&mut self, inputs: &[f32], label: &[f32]) -> Vec<f32> {
        let activations = Vector::owned(self.last_activations.clone());
        let y = Vector::owned(label.to_vec());
        let cost_delta = vec_sub(&activations, &y);

        let delta: Vec<f32> = cost_delta
            .as_slice()
            .iter()
            .zip(&self.last_z)
            .map(|(d, z)| d * sigmoid_prime(*z))
            .collect();
        let delta_vec = Vector::owned(delta.clone());
        let input_vec = Vector::owned(inputs.to_vec());

        let grad_w_contribution = outer_product(&delta_vec, &input_vec);
        for (acc, g) in self
            .grad_weights
            .as_mut_slice()
            .iter_mut()
            .zip(grad_w_contribution.as_slice())
        {
            *acc += g;
        }
        for (acc, d) in self.grad_biases.as_mut_slice().iter_mut().zip(&delta) {
            *acc += d;
        }

        mat_transpose_vec_mul(&self.weights, &delta_vec).as_slice().to_vec()
    }

    pub fn update_params(&mut self, epoch: u32) {
        let rate = self.learn_rate * self.learn_rate_decay.powi(epoch as i32);
        for (w, g) in self.weights.as_mut_slice().iter_mut().zip(self.grad_weights.as_slice()) {
            *w -= g * rate;
        }
        for (b, g) in self.biases.as_mut_slice().iter_mut().zip(self.grad_biases.as_slice()) {
            *b -= g * rate;
        }
        self.grad_weights.as_mut_slice().iter_mut().for_each(|v| *v = 0.0);
        self.grad_biases.as_mut_slice().iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn write_to_stream(&self, sink: &mut impl std::io::Write) -> std::io::Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        for b in self.biases.as_slice() {
            sink.write_f32::<LittleEndian>(*b)?;
        }
        for w in self.weights.as_slice() {
            sink.write_f32::<LittleEndian>(*w)?;
        }
        Ok(())
    }

    pub fn read_from_stream(&mut self, src: &mut impl std::io::Read) -> std::io::Result<()> {
        use byteorder::{LittleEndian, ReadBytesExt};
        for b in self.biases.as_mut_slice() {
            *b = src.read_f32::<LittleEndian>()?;
        }
        for w in self.weights.as_mut_slice() {
            *w = src.read_f32::<LittleEndian>()?;
        }
        Ok(())
    }
}
