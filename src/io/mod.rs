//! External-interface traits the training driver and classifier depend on.
//!
//! The concrete loaders (filesystem access, bitmap/CSV parsing, path
//! resolution) are explicitly out of scope (§1); this module only fixes the
//! two calls the core actually makes — `load_samples` and
//! `seek_to_beginning` — plus the small normalization/label-mapping value
//! types the core's forward/backward passes and classifier need.

pub mod bitmap;
pub mod csv_loader;

use crate::config::Config;
use crate::error::Result;
use crate::shape::Shape3;

pub use bitmap::BitmapSource;
pub use csv_loader::CsvDataLoader;

/// `(x - min) / (max - min)`, applied per scalar by loaders (§3, §6.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationParams {
    pub min: f32,
    pub max: f32,
}

impl NormalizationParams {
    pub fn normalize(&self, x: f32) -> f32 {
        (x - self.min) / (self.max - self.min)
    }
}

/// Canonical label-string-to-one-hot-position mapping, plus the
/// normalization and input shape that apply to every sample in a data set.
#[derive(Debug, Clone)]
pub struct DataDetails {
    pub normalization: NormalizationParams,
    pub class_labels: Vec<String>,
    pub shape: Shape3,
}

impl DataDetails {
    /// Reads the `data` config object (§6.4): `{normalization:{min,max},
    /// classes:[string...], shape:[W,H,D]}`.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let normalization = cfg.get_child("normalization")?;
        let classes = cfg.get_str_list("classes")?.to_vec();
        let shape = cfg.get_int_list("shape")?;
        if shape.len() != 3 {
            return Err(crate::error::RichardError::config("shape", "expected [W, H, D]"));
        }
        Ok(DataDetails {
            normalization: NormalizationParams { min: normalization.get_f32("min")?, max: normalization.get_f32("max")? },
            class_labels: classes,
            shape: Shape3::new(shape[0] as u32, shape[1] as u32, shape[2] as u32),
        })
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.class_labels.iter().position(|l| l == label)
    }

    /// One-hot vector for `label`, or `None` if `label` is not in
    /// `class_labels` (e.g. the `"_"` placeholder for an absent label).
    pub fn one_hot(&self, label: &str) -> Option<Vec<f32>> {
        let index = self.label_index(label)?;
        let mut v = vec![0.0_f32; self.class_labels.len()];
        v[index] = 1.0;
        Some(v)
    }
}

/// One training or evaluation example: a label (the empty-label placeholder
/// is `"_"`, §6.3) and its normalized, flattened feature vector.
#[derive(Debug, Clone)]
pub struct Sample {
    pub label: String,
    pub data: Vec<f32>,
}

/// The surface the training driver and classifier depend on. Concrete
/// loaders (CSV-, bitmap-, or otherwise backed) live outside the core;
/// `CsvDataLoader` is a minimal reference implementation.
pub trait LabelledDataSet: Send {
    /// The loader's fixed fetch granularity; the GPU training path requires
    /// this to be a multiple of `miniBatchSize` (§4.4 pre-flight checks).
    fn fetch_size(&self) -> usize;

    /// Loads up to `count` samples starting from the current cursor.
    /// Returns fewer than `count` at the end of the data set, and an empty
    /// vector once exhausted. Fatal (via `RichardError::Io` or similar) if
    /// the data set is empty on the very first call.
    fn load_samples(&mut self, count: usize) -> Result<Vec<Sample>>;

    /// Resets the read cursor to the start of the data set, called by the
    /// training driver at the end of every epoch.
    fn seek_to_beginning(&mut self);
}
