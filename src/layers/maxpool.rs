//! Max-pooling layer: no parameters, non-overlapping `(regionW, regionH)`
//! windows per depth slice, argmax mask recorded for backprop.

use crate::config::Config;
use crate::error::{Result, RichardError};
use crate::shape::Shape3;

#[derive(Debug)]
pub struct MaxPoolLayer {
    input_shape: Shape3,
    region_w: usize,
    region_h: usize,
    out_w: usize,
    out_h: usize,
    depth: usize,
    /// One entry per input element: 1.0 at the argmax of its region, else 0.0.
    last_mask: Vec<f32>,
}

impl MaxPoolLayer {
    pub fn output_shape(&self) -> Shape3 {
        Shape3::new(self.out_w as u32, self.out_h as u32, self.depth as u32)
    }

    pub fn fresh(input_shape: Shape3, region_w: usize, region_h: usize) -> Result<Self> {
        let in_w = input_shape.w() as usize;
        let in_h = input_shape.h() as usize;
        let depth = input_shape.d() as usize;
        if region_w == 0 || region_h == 0 || in_w % region_w != 0 || in_h % region_h != 0 {
            return Err(RichardError::shape(format!(
                "max-pooling region {}x{} does not evenly divide input {}x{}",
                region_w, region_h, in_w, in_h
            )));
        }
        let out_w = in_w / region_w;
        let out_h = in_h / region_h;
        Ok(MaxPoolLayer {
            input_shape,
            region_w,
            region_h,
            out_w,
            out_h,
            depth,
            last_mask: vec![0.0; in_w * in_h * depth],
        })
    }

    pub fn from_config(cfg: &Config, input_shape: Shape3) -> Result<Self> {
        let region = cfg.get_int_list("regionSize")?;
        if region.len() != 2 {
            return Err(RichardError::config("regionSize", "expected [W, H]"));
        }
        Self::fresh(input_shape, region[0] as usize, region[1] as usize)
    }

    fn forward_into(&self, inputs: &[f32], mask: Option<&mut [f32]>) -> Vec<f32> {
        let in_w = self.input_shape.w() as usize;
        let in_h = self.input_shape.h() as usize;
        let mut out = vec![0.0_f32; self.out_w * self.out_h * self.depth];
        let mut mask = mask;
        if let Some(m) = mask.as_deref_mut() {
            m.iter_mut().for_each(|v| *v = 0.0);
        }
        for z in 0..self.depth {
            for oy in 0..self.out_h {
                for ox in 0..self.out_w {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_idx = (ox * self.region_w, oy * self.region_h);
                    for ry in 0..self.region_h {
                        for rx in 0..self.region_w {
                            let x = ox * self.region_w + rx;
                            let y = oy * self.region_h + ry;
                            let v = inputs[x + y * in_w + z * in_w * in_h];
                            if v > best {
                                best = v;
                                best_idx = (x, y);
                            }
                        }
                    }
                    out[ox + oy * self.out_w + z * self.out_w * self.out_h] = best;
                    if let Some(m) = mask.as_deref_mut() {
                        let (x, y) = best_idx;
                        m[x + y * in_w + z * in_w * in_h] = 1.0;
                    }
                }
            }
        }
        out
    }

    pub fn train_forward(&mut self, inputs: &[f32]) -> Vec<f32> {
        let mut mask = std::mem::take(&mut self.last_mask);
        let out = self.forward_into(inputs, Some(&mut mask));
        self.last_mask = mask;
        out
    }

    pub fn eval_forward(&self, inputs: &[f32]) -> Vec<f32> {
        self.forward_into(inputs, None)
    }

    pub fn update_deltas(&mut self, _inputs: &[f32], output_delta: &[f32]) -> Vec<f32> {
        let in_w = self.input_shape.w() as usize;
        let in_h = self.input_shape.h() as usize;
        let mut input_delta = vec![0.0_f32; in_w * in_h * self.depth];
        for z in 0..self.depth {
            for y in 0..in_h {
                for x in 0..in_w {
                    let idx = x + y * in_w + z * in_w * in_h;
                    if self.last_mask[idx] == 1.0 {
                        let ox = x / self.region_w;
                        let oy = y / self.region_h;
                        input_delta[idx] =
                            output_delta[ox + oy * self.out_w + z * self.out_w * self.out_h];
                    }
                }
            }
        }
        input_delta
    }

    /// No parameters to update.
    pub fn update_params(&mut self, _epoch: u32) {}

    /// Emits nothing (§4.2.3).
    pub fn write_to_stream(&self, _sink: &mut impl std::io::Write) -> std::io::Result<()> {
        Ok(())
    }

    pub fn read_from_stream(&mut self, _src: &mut impl std::io::Read) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_2x2_over_4x4_depth1() {
        let input_shape = Shape3::new(4, 4, 1);
        let mut layer = MaxPoolLayer::fresh(input_shape, 2, 2).unwrap();
        #[rustfmt::skip]
        let input = vec![
            0.0, 1.0, 2.0, 3.0,
            4.0, 5.0, 6.0, 7.0,
            8.0, 9.0, 0.0, 1.0,
            2.0, 3.0, 4.0, 5.0,
        ];
        let out = layer.train_forward(&input);
        assert_eq!(out, vec![5.0, 7.0, 9.0, 5.0]);

        let mut ones = 0;
        let mut positions = Vec::new();
        for y in 0..4 {
            for x in 0..4 {
                if layer.last_mask[x + y * 4] == 1.0 {
                    ones += 1;
                    positions.push((x, y));
                }
            }
        }
        assert_eq!(ones, 4);
        assert_eq!(positions, vec![(1, 1), (3, 1), (1, 2), (3, 3)]);
    }

    #[test]
    fn backprop_scatters_delta_to_argmax_positions() {
        let input_shape = Shape3::new(4, 4, 1);
        let mut layer = MaxPoolLayer::fresh(input_shape, 2, 2).unwrap();
        #[rustfmt::skip]
        let input = vec![
            0.0, 1.0, 2.0, 3.0,
            4.0, 5.0, 6.0, 7.0,
            8.0, 9.0, 0.0, 1.0,
            2.0, 3.0, 4.0, 5.0,
        ];
        layer.train_forward(&input);
        let output_delta = vec![9.0, 8.0, 7.0, 6.0];
        let input_delta = layer.update_deltas(&input, &output_delta);

        let mut expected = vec![0.0; 16];
        expected[3 + 0 * 4] = 8.0;
        expected[0 + 1 * 4] = 9.0;
        expected[1 + 2 * 4] = 7.0;
        expected[3 + 3 * 4] = 6.0;
        assert_eq!(input_delta, expected);
    }
}
