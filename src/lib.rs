//! A feed-forward neural network training and inference engine. A network
//! is a flat stack of layers (dense, convolutional, max-pooling, output)
//! trained by mini-batch gradient descent, on the CPU or on a Vulkan
//! compute device, from CSV or bitmap samples, persisted to a single
//! binary artifact alongside the JSON config that describes its topology.

pub mod activations;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod io;
pub mod layers;
pub mod network;
pub mod persist;
pub mod shape;
pub mod tensor;
pub mod training;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use classifier::{Classifier, ClassifierResults};
pub use config::{parse_config, Config, ConfigValue};
pub use error::{Result, RichardError};
pub use events::{Event, EventBus, EventId};
pub use network::{Hyperparams, Network};
pub use shape::Shape3;
