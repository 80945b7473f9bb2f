//! Binary artifact layout at the system boundary (§6.1):
//!
//! ```text
//! [ u64 configByteLength ]
//! [ configByteLength bytes: UTF-8 JSON of the network config ]
//! [ per layer, in declaration order: biases then weights/kernels ]
//! ```
//!
//! Max-pooling layers contribute nothing to the parameter section. Readers
//! reconstruct the topology from the embedded JSON, then consume
//! parameters from the remainder of the stream in the same order.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::config::{parse_config, Config};
use crate::error::{Result, RichardError};
use crate::network::Network;
use crate::shape::Shape3;

pub fn write_artifact(network: &Network, config_json: &str, sink: &mut impl std::io::Write) -> Result<()> {
    let bytes = config_json.as_bytes();
    sink.write_u64::<LittleEndian>(bytes.len() as u64)
        .map_err(|e| RichardError::io("<artifact>", e))?;
    sink.write_all(bytes).map_err(|e| RichardError::io("<artifact>", e))?;
    network.write_params(sink).map_err(|e| RichardError::io("<artifact>", e))
}

/// Reads the embedded config and reconstructs a `Network`, then consumes
/// its parameters from the rest of the stream. `input_shape` is not itself
/// persisted in the artifact; the caller supplies it (typically from the
/// surrounding `data` config section).
pub fn read_artifact(input_shape: Shape3, source: &mut impl std::io::Read) -> Result<(Config, Network)> {
    let len = source.read_u64::<LittleEndian>().map_err(|e| RichardError::io("<artifact>", e))?;
    let mut buf = vec![0u8; len as usize];
    source.read_exact(&mut buf).map_err(|e| RichardError::io("<artifact>", e))?;
    let json = String::from_utf8(buf)
        .map_err(|e| RichardError::config("<artifact>", format!("embedded config is not UTF-8: {e}")))?;
    let cfg = parse_config(&json)?;
    let network_cfg = cfg.get_child("network")?;
    let network = Network::restore(network_cfg, input_shape, source)?;
    Ok((cfg, network))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config as parse;

    fn net_config_json() -> &'static str {
        r#"{
            "network": {
                "hyperparams": {"epochs": 1, "batchSize": 1, "miniBatchSize": 1},
                "hiddenLayers": [
                    {"type": "dense", "size": 3, "learnRate": 0.1, "learnRateDecay": 1.0, "dropoutRate": 0.0}
                ],
                "outputLayer": {"type": "output", "size": 2, "learnRate": 0.1, "learnRateDecay": 1.0}
            }
        }"#
    }

    #[test]
    fn round_trip_preserves_parameters() {
        let full_cfg = parse(net_config_json()).unwrap();
        let network_cfg = full_cfg.get_child("network").unwrap();
        let input_shape = Shape3::vector(4);
        let network = Network::fresh(network_cfg, input_shape).unwrap();

        let mut buf = Vec::new();
        write_artifact(&network, net_config_json(), &mut buf).unwrap();

        let mut cursor = std::io::Cursor::new(buf.clone());
        let (_, restored) = read_artifact(input_shape, &mut cursor).unwrap();

        let mut original_params = Vec::new();
        network.write_params(&mut original_params).unwrap();
        let mut restored_params = Vec::new();
        restored.write_params(&mut restored_params).unwrap();
        assert_eq!(original_params, restored_params);
    }
}
