//! Convolutional layer: one cross-correlation filter per output depth slice,
//! ReLU activation, per-element dropout.

use crate::activations::relu;
use crate::config::Config;
use crate::error::{Result, RichardError};
use crate::layers::dense::apply_dropout;
use crate::shape::Shape3;
use crate::tensor::ops::{cross_correlate, full_convolve, gaussian_fill};
use crate::tensor::{Array2, Array3, Kernel};

const WEIGHT_STD_DEV: f32 = 0.1;

/// One learned filter: a `(W_K, H_K, inputDepth)` kernel plus a scalar bias.
#[derive(Debug)]
pub struct Filter {
    pub kernel: Kernel<'static>,
    pub bias: f32,
    grad_kernel: Kernel<'static>,
    grad_bias: f32,
}

impl Filter {
    fn fresh(kw: usize, kh: usize, in_depth: usize) -> Self {
        let mut kernel = Kernel::zeros(kw, kh, in_depth);
        gaussian_fill(kernel.as_mut_slice(), WEIGHT_STD_DEV);
        Filter {
            kernel,
            bias: 0.0,
            grad_kernel: Kernel::zeros(kw, kh, in_depth),
            grad_bias: 0.0,
        }
    }
}

#[derive(Debug)]
pub struct ConvLayer {
    pub(crate) input_shape: Shape3,
    pub(crate) kernel_w: usize,
    pub(crate) kernel_h: usize,
    pub(crate) depth: usize,
    pub(crate) filters: Vec<Filter>,
    pub(crate) learn_rate: f32,
    pub(crate) learn_rate_decay: f32,
    pub(crate) dropout_rate: f32,
    out_w: usize,
    out_h: usize,
    /// Pre-activation `Z`, one `out_w*out_h` plane per filter.
    last_z: Vec<Array2<'static>>,
}

impl ConvLayer {
    pub fn output_shape(&self) -> Shape3 {
        Shape3::new(self.out_w as u32, self.out_h as u32, self.depth as u32)
    }

    pub fn fresh(
        input_shape: Shape3,
        kernel_w: usize,
        kernel_h: usize,
        depth: usize,
        learn_rate: f32,
        learn_rate_decay: f32,
        dropout_rate: f32,
    ) -> Result<Self> {
        let in_w = input_shape.w() as usize;
        let in_h = input_shape.h() as usize;
        let in_d = input_shape.d() as usize;
        if kernel_w > in_w || kernel_h > in_h {
            return Err(RichardError::shape(format!(
                "convolutional kernel {}x{} is larger than input {}x{}",
                kernel_w, kernel_h, in_w, in_h
            )));
        }
        let out_w = in_w - kernel_w + 1;
        let out_h = in_h - kernel_h + 1;
        let filters = (0..depth).map(|_| Filter::fresh(kernel_w, kernel_h, in_d)).collect();
        Ok(ConvLayer {
            input_shape,
            kernel_w,
            kernel_h,
            depth,
            filters,
            learn_rate,
            learn_rate_decay,
            dropout_rate,
            out_w,
            out_h,
            last_z: (0..depth).map(|_| Array2::zeros(out_w, out_h)).collect(),
        })
    }

    pub fn from_config(cfg: &Config, input_shape: Shape3) -> Result<Self> {
        let depth = cfg.get_usize("depth")?;
        let kernel_size = cfg.get_int_list("kernelSize")?;
        if kernel_size.len() != 2 {
            return Err(RichardError::config("kernelSize", "expected [W, H]"));
        }
        let learn_rate = cfg.get_f32("learnRate")?;
        let learn_rate_decay = cfg.get_f32("learnRateDecay")?;
        let dropout_rate = cfg.get_f32("dropoutRate")?;
        if !(0.0..1.0).contains(&dropout_rate) {
            return Err(RichardError::config("dropoutRate", "must be in [0, 1)"));
        }
        Self::fresh(
            input_shape,
            kernel_size[0] as usize,
            kernel_size[1] as usize,
            depth,
            learn_rate,
            learn_rate_decay,
            dropout_rate,
        )
    }

    fn input_as_array3(&self, inputs: &[f32]) -> Array3<'static> {
        Array3::owned(
            self.input_shape.w() as usize,
            self.input_shape.h() as usize,
            self.input_shape.d() as usize,
            inputs.to_vec(),
        )
    }

    pub fn train_forward(&mut self, inputs: &[f32]) -> Vec<f32> {
        let image = self.input_as_array3(inputs);
        let mut out = vec![0.0_f32; self.out_w * self.out_h * self.depth];
        for (slice, filter) in self.filters.iter().enumerate() {
            let plane = cross_correlate(&image, &filter.kernel);
            self.last_z[slice] = Array2::owned(
                self.out_w,
                self.out_h,
                plane.as_slice().iter().map(|z| z + filter.bias).collect(),
            );
            for y in 0..self.out_h {
                for x in 0..self.out_w {
                    out[x + y * self.out_w + slice * self.out_w * self.out_h] =
                        relu(self.last_z[slice].at(x, y));
                }
            }
        }
        apply_dropout(&mut out, self.dropout_rate);
        out
    }

    pub fn eval_forward(&self, inputs: &[f32]) -> Vec<f32> {
        let image = self.input_as_array3(inputs);
        let mut out = vec![0.0_f32; self.out_w * self.out_h * self.depth];
        for (slice, filter) in self.filters.iter().enumerate() {
            let plane = cross_correlate(&image, &filter.kernel);
            for y in 0..self.out_h {
                for x in 0..self.out_w {
                    out[x + y * self.out_w + slice * self.out_w * self.out_h] =
                        relu(plane.at(x, y) + filter.bias);
                }
            }
        }
        out
    }

    pub fn update_deltas(&mut self, inputs: &[f32], output_delta: &[f32]) -> Vec<f32> {
        use crate::activations::relu_prime;

        let in_w = self.input_shape.w() as usize;
        let in_h = self.input_shape.h() as usize;
        let in_d = self.input_shape.d() as usize;
        let image = self.input_as_array3(inputs);

        let mut input_delta = vec![0.0_f32; in_w * in_h * in_d];

        for (slice, filter) in self.filters.iter_mut().enumerate() {
            let z = &self.last_z[slice];
            let mut delta = Array2::zeros(self.out_w, self.out_h);
            for y in 0..self.out_h {
                for x in 0..self.out_w {
                    let od = output_delta[x + y * self.out_w + slice * self.out_w * self.out_h];
                    delta.set(x, y, od * relu_prime(z.at(x, y)));
                }
            }

            for k in 0..in_d {
                for j in 0..self.kernel_h {
                    for i in 0..self.kernel_w {
                        let mut acc = 0.0_f32;
                        for y in 0..self.out_h {
                            for x in 0..self.out_w {
                                acc += image.at(x + i, y + j, k) * delta.at(x, y);
                            }
                        }
                        let g = filter.grad_kernel.at(i, j, k) + acc;
                        filter.grad_kernel.set(i, j, k, g);
                    }
                }
            }
            filter.grad_bias += delta.as_slice().iter().sum::<f32>();

            for k in 0..in_d {
                let contribution = full_convolve(&delta, &filter.kernel, k);
                for y in 0..in_h {
                    for x in 0..in_w {
                        input_delta[x + y * in_w + k * in_w * in_h] += contribution.at(x, y);
                    }
                }
            }
        }

        input_delta
    }

    pub fn update_params(&mut self, epoch: u32) {
        let scale = 1.0 / (self.out_w * self.out_h) as f32;
        let rate = self.learn_rate * self.learn_rate_decay.powi(epoch as i32) * scale;
        for filter in &mut self.filters {
            for (k, g) in filter.kernel.as_mut_slice().iter_mut().zip(filter.grad_kernel.as_slice()) {
                *k -= g * rate;
            }
            filter.bias -= filter.grad_bias * rate;
            filter.grad_kernel.as_mut_slice().iter_mut().for_each(|v| *v = 0.0);
            filter.grad_bias = 0.0;
        }
    }

    pub fn write_to_stream(&self, sink: &mut impl std::io::Write) -> std::io::Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        for filter in &self.filters {
            sink.write_f32::<LittleEndian>(filter.bias)?;
            for v in filter.kernel.as_slice() {
                sink.write_f32::<LittleEndian>(*v)?;
            }
        }
        Ok(())
    }

    pub fn read_from_stream(&mut self, src: &mut impl std::io::Read) -> std::io::Result<()> {
        use byteorder::{LittleEndian, ReadBytesExt};
        for filter in &mut self.filters {
            filter.bias = src.read_f32::<LittleEndian>()?;
            for v in filter.kernel.as_mut_slice() {
                *v = src.read_f32::<LittleEndian>()?;
            }
        }
        Ok(())
    }
}
