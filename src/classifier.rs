//! Trains/tests a `Network`, measuring top-1 match against one-hot class
//! vectors, and streams its persisted weights (§4.6).

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::error::Result;
use crate::events::EventBus;
use crate::io::{DataDetails, LabelledDataSet};
use crate::network::Network;
use crate::training;

/// Aggregate outcome of `Classifier::test`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierResults {
    pub good: usize,
    pub bad: usize,
    pub cost: f32,
}

pub struct Classifier {
    network: Network,
    details: DataDetails,
    trained: bool,
}

impl Classifier {
    pub fn new(network: Network, details: DataDetails) -> Self {
        Classifier { network, details, trained: false }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.network.abort_handle()
    }

    pub fn abort(&self) {
        self.network.abort();
    }

    pub fn train(&mut self, data: Box<dyn LabelledDataSet>, events: &EventBus) -> Result<()> {
        training::train(&mut self.network, data, &self.details, events)?;
        self.trained = true;
        Ok(())
    }

    /// Runs the same training loop on a Vulkan compute device (§4.4 GPU
    /// training path). `cfg` must be the config `self.network` was built
    /// from; on success `self.network`'s parameters hold the downloaded,
    /// trained values, exactly as after [`Classifier::train`].
    #[cfg(feature = "gpu")]
    pub fn train_gpu(
        &mut self,
        runtime: &mut crate::gpu::GpuRuntime,
        cfg: &crate::config::Config,
        data: Box<dyn LabelledDataSet>,
        events: &EventBus,
    ) -> Result<()> {
        let modules = runtime.load_default_shader_set()?;
        let gpu_net = crate::gpu::GpuNetwork::upload(runtime, &modules, cfg, &self.network)?;
        crate::gpu::training::train(runtime, &gpu_net, &mut self.network, data, &self.details, events)?;
        self.trained = true;
        Ok(())
    }

    /// Loads samples with a one-batch look-ahead, comparing the network's
    /// evaluation argmax to the label's one-hot argmax for each one.
    pub fn test(&self, mut data: Box<dyn LabelledDataSet>) -> Result<ClassifierResults> {
        let mut good = 0usize;
        let mut bad = 0usize;
        let mut cost_accum = 0.0_f32;
        let mut count = 0usize;

        let fetch_size = data.fetch_size().max(1);
        let mut next = data.load_samples(fetch_size)?;
        while !next.is_empty() {
            let current = next;
            next = data.load_samples(fetch_size)?;

            for sample in &current {
                let Some(expected) = self.details.one_hot(&sample.label) else {
                    continue;
                };
                let predicted = self.network.eval_forward(&sample.data);
                cost_accum += Network::cost(&expected, &predicted);
                count += 1;

                if argmax(&predicted) == argmax(&expected) {
                    good += 1;
                } else {
                    bad += 1;
                }
            }
        }

        let cost = if count > 0 { cost_accum / count as f32 } else { 0.0 };
        Ok(ClassifierResults { good, bad, cost })
    }

    /// Dumps layer parameters in declaration order. Fatal if called on an
    /// untrained classifier (§7, "Precondition violation").
    pub fn write_to_stream(&self, config_json: &str, sink: &mut impl std::io::Write) -> Result<()> {
        if !self.trained {
            return Err(crate::error::RichardError::precondition(
                "cannot persist an untrained classifier",
            ));
        }
        crate::persist::write_artifact(&self.network, config_json, sink)
    }
}

fn argmax(v: &[f32]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::io::{NormalizationParams, Sample};
    use crate::shape::Shape3;

    struct FixedDataSet {
        samples: Vec<Sample>,
        cursor: usize,
    }

    impl LabelledDataSet for FixedDataSet {
        fn fetch_size(&self) -> usize {
            self.samples.len().max(1)
        }

        fn load_samples(&mut self, count: usize) -> Result<Vec<Sample>> {
            let end = (self.cursor + count).min(self.samples.len());
            let batch = self.samples[self.cursor..end].to_vec();
            self.cursor = end;
            Ok(batch)
        }

        fn seek_to_beginning(&mut self) {
            self.cursor = 0;
        }
    }

    fn tiny_config() -> (Network, DataDetails) {
        let json = r#"{
            "hyperparams": {"epochs": 1, "batchSize": 1, "miniBatchSize": 1},
            "hiddenLayers": [
                {"type": "dense", "size": 4, "learnRate": 0.5, "learnRateDecay": 1.0, "dropoutRate": 0.0}
            ],
            "outputLayer": {"type": "output", "size": 2, "learnRate": 0.5, "learnRateDecay": 1.0}
        }"#;
        let cfg = parse_config(json).unwrap();
        let network = Network::fresh(&cfg, Shape3::vector(3)).unwrap();
        let details = DataDetails {
            normalization: NormalizationParams { min: 0.0, max: 1.0 },
            class_labels: vec!["a".to_string(), "b".to_string()],
            shape: Shape3::vector(3),
        };
        (network, details)
    }

    #[test]
    fn one_epoch_one_sample_never_panics_and_reports_a_finite_cost() {
        let (network, details) = tiny_config();
        let mut classifier = Classifier::new(network, details);

        let sample = Sample { label: "a".to_string(), data: vec![0.5, 0.3, 0.7] };
        let events = EventBus::new();
        classifier
            .train(
                Box::new(FixedDataSet { samples: vec![sample.clone()], cursor: 0 }),
                &events,
            )
            .unwrap();

        let results = classifier
            .test(Box::new(FixedDataSet { samples: vec![sample], cursor: 0 }))
            .unwrap();
        assert_eq!(results.good + results.bad, 1);
        assert!(results.cost.is_finite());
    }

    #[test]
    fn untrained_classifier_refuses_to_persist() {
        let (network, details) = tiny_config();
        let classifier = Classifier::new(network, details);
        let mut buf = Vec::new();
        assert!(classifier.write_to_stream("{}", &mut buf).is_err());
    }
}
