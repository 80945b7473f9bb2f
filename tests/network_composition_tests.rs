use std::cell::RefCell;
use std::rc::Rc;

use richard::config::parse_config;
use richard::events::EventBus;
use richard::io::{LabelledDataSet, Sample};
use richard::{Network, Shape3};

// Same topology as the worked example in the CLI's `gen train` output:
// convolutional -> max-pooling -> dense -> output.
fn mnist_like_config() -> &'static str {
    r#"{
        "hyperparams": {"epochs": 2, "batchSize": 4, "miniBatchSize": 2},
        "hiddenLayers": [
            {"type": "convolutional", "depth": 2, "kernelSize": [3, 3], "learnRate": 0.1, "learnRateDecay": 1.0, "dropoutRate": 0.0},
            {"type": "maxPooling", "regionSize": [2, 2]},
            {"type": "dense", "size": 8, "learnRate": 0.1, "learnRateDecay": 1.0, "dropoutRate": 0.0}
        ],
        "outputLayer": {"type": "output", "size": 3, "learnRate": 0.1, "learnRateDecay": 1.0}
    }"#
}

#[test]
fn shape_flows_through_conv_pool_dense_output() {
    let cfg = parse_config(mnist_like_config()).unwrap();
    let net = Network::fresh(&cfg, Shape3::new(6, 6, 1)).unwrap();
    // conv: 6x6x1 -> 4x4x2 (valid 3x3 kernel); pool 2x2 -> 2x2x2; dense -> 8;
    // output -> 3.
    assert_eq!(net.output_size(), 3);
}

struct InMemoryDataSet {
    samples: Vec<Sample>,
    cursor: usize,
    fetch_size: usize,
}

impl LabelledDataSet for InMemoryDataSet {
    fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    fn load_samples(&mut self, count: usize) -> richard::Result<Vec<Sample>> {
        let end = (self.cursor + count).min(self.samples.len());
        let batch = self.samples[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(batch)
    }

    fn seek_to_beginning(&mut self) {
        self.cursor = 0;
    }
}

fn four_samples(shape: Shape3) -> Vec<Sample> {
    let labels = ["a", "b", "a", "b"];
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| Sample {
            label: label.to_string(),
            data: (0..shape.len()).map(|j| ((i + j) as f32 * 0.1) % 1.0).collect(),
        })
        .collect()
}

#[test]
fn training_loop_runs_two_epochs_and_reports_finite_costs() {
    let json = r#"{
        "hyperparams": {"epochs": 2, "batchSize": 4, "miniBatchSize": 2},
        "hiddenLayers": [
            {"type": "dense", "size": 5, "learnRate": 0.3, "learnRateDecay": 0.9, "dropoutRate": 0.0}
        ],
        "outputLayer": {"type": "output", "size": 2, "learnRate": 0.3, "learnRateDecay": 0.9}
    }"#;
    let cfg = parse_config(json).unwrap();
    let shape = Shape3::vector(4);
    let mut net = Network::fresh(&cfg, shape).unwrap();

    let details = richard::io::DataDetails {
        normalization: richard::io::NormalizationParams { min: 0.0, max: 1.0 },
        class_labels: vec!["a".to_string(), "b".to_string()],
        shape,
    };
    let data: Box<dyn LabelledDataSet> =
        Box::new(InMemoryDataSet { samples: four_samples(shape), cursor: 0, fetch_size: 4 });

    let completed_epochs = Rc::new(RefCell::new(Vec::new()));
    let recorded = completed_epochs.clone();
    let events = EventBus::new();
    let _sub = events.listen(richard::events::Event::EPOCH_COMPLETED, move |event| {
        if let richard::events::Event::EpochCompleted { cost, .. } = event {
            recorded.borrow_mut().push(*cost);
        }
    });

    richard::training::train(&mut net, data, &details, &events).unwrap();
    let costs = completed_epochs.borrow();
    assert_eq!(costs.len(), 2);
    assert!(costs.iter().all(|c| c.is_finite()));
}

#[test]
fn restore_reproduces_a_fresh_networks_parameters() {
    let cfg = parse_config(
        r#"{
        "hyperparams": {"epochs": 1, "batchSize": 1, "miniBatchSize": 1},
        "hiddenLayers": [
            {"type": "dense", "size": 3, "learnRate": 0.1, "learnRateDecay": 1.0, "dropoutRate": 0.0}
        ],
        "outputLayer": {"type": "output", "size": 2, "learnRate": 0.1, "learnRateDecay": 1.0}
    }"#,
    )
    .unwrap();
    let shape = Shape3::vector(4);
    let net = Network::fresh(&cfg, shape).unwrap();

    let mut buf = Vec::new();
    net.write_params(&mut buf).unwrap();

    let restored = Network::restore(&cfg, shape, &mut std::io::Cursor::new(buf.clone())).unwrap();
    let mut restored_buf = Vec::new();
    restored.write_params(&mut restored_buf).unwrap();
    assert_eq!(buf, restored_buf);
}
