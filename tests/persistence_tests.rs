use std::io::{Cursor, Write};

use richard::config::parse_config;
use richard::events::EventBus;
use richard::io::{CsvDataLoader, DataDetails, LabelledDataSet};
use richard::{persist, Classifier, Network, Shape3};

fn full_artifact_config() -> &'static str {
    r#"{
        "data": {
            "normalization": {"min": 0.0, "max": 9.0},
            "classes": ["low", "high"],
            "shape": [3, 1, 1]
        },
        "dataLoader": {"fetchSize": 2},
        "network": {
            "hyperparams": {"epochs": 1, "batchSize": 2, "miniBatchSize": 1},
            "hiddenLayers": [
                {"type": "dense", "size": 4, "learnRate": 0.2, "learnRateDecay": 1.0, "dropoutRate": 0.0}
            ],
            "outputLayer": {"type": "output", "size": 2, "learnRate": 0.2, "learnRateDecay": 1.0}
        }
    }"#
}

fn write_temp_csv(contents: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("richard-persist-test-{}-{}.csv", std::process::id(), contents.len()));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn csv_loader_feeds_a_trained_classifier_through_a_persisted_artifact() {
    let cfg = parse_config(full_artifact_config()).unwrap();
    let details = DataDetails::from_config(cfg.get_child("data").unwrap()).unwrap();
    let fetch_size = cfg.get_child("dataLoader").unwrap().get_usize("fetchSize").unwrap();
    let network_cfg = cfg.get_child("network").unwrap();

    let csv_path = write_temp_csv("low,1,2,3\nhigh,7,8,9\n");
    let loader = CsvDataLoader::open(&csv_path, fetch_size, &details).unwrap();

    let network = Network::fresh(network_cfg, details.shape).unwrap();
    let mut classifier = Classifier::new(network, details.clone());
    let events = EventBus::new();
    classifier.train(Box::new(loader), &events).unwrap();

    let config_json = full_artifact_config();
    let mut artifact = Vec::new();
    classifier.write_to_stream(config_json, &mut artifact).unwrap();

    let mut cursor = Cursor::new(&artifact);
    let (restored_cfg, restored_network) = persist::read_artifact(Shape3::new(3, 1, 1), &mut cursor).unwrap();
    let restored_details = DataDetails::from_config(restored_cfg.get_child("data").unwrap()).unwrap();
    assert_eq!(restored_details.class_labels, details.class_labels);

    let restored_classifier = Classifier::new(restored_network, restored_details);
    let loader_for_eval = CsvDataLoader::open(&csv_path, fetch_size, &details).unwrap();
    let results = restored_classifier.test(Box::new(loader_for_eval)).unwrap();
    assert_eq!(results.good + results.bad, 2);
    assert!(results.cost.is_finite());

    std::fs::remove_file(&csv_path).ok();
}

#[test]
fn artifact_round_trip_is_byte_identical_after_persisting_twice() {
    let cfg = parse_config(full_artifact_config()).unwrap();
    let network_cfg = cfg.get_child("network").unwrap();
    let shape = Shape3::new(3, 1, 1);
    let network = Network::fresh(network_cfg, shape).unwrap();
    let mut classifier = Classifier::new(network, DataDetails::from_config(cfg.get_child("data").unwrap()).unwrap());

    let csv_path = write_temp_csv("low,1,2,3\n");
    let details = DataDetails::from_config(cfg.get_child("data").unwrap()).unwrap();
    let loader = CsvDataLoader::open(&csv_path, 1, &details).unwrap();
    let events = EventBus::new();
    classifier.train(Box::new(loader), &events).unwrap();

    let config_json = full_artifact_config();
    let mut first = Vec::new();
    classifier.write_to_stream(config_json, &mut first).unwrap();

    let mut cursor = Cursor::new(&first);
    let (_, restored) = persist::read_artifact(shape, &mut cursor).unwrap();
    let mut second = Vec::new();
    persist::write_artifact(&restored, config_json, &mut second).unwrap();

    assert_eq!(first, second);
    std::fs::remove_file(&csv_path).ok();
}
