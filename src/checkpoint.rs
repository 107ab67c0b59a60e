//! Checkpoint persistence for trained networks.
//!
//! Serializes the full network (masks, latent weights, biases, accumulators)
//! plus training progress to JSON, so a run can resume where it stopped or a
//! trained model can be reloaded for inference.

use crate::core::TritNet;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

/// A network together with the training progress that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Epochs completed when the checkpoint was taken.
    pub epoch: usize,
    /// Whole-dataset loss at checkpoint time.
    pub loss: f32,
    pub net: TritNet,
}

/// Write a checkpoint as JSON.
pub fn save_checkpoint<P: AsRef<Path>>(path: P, checkpoint: &Checkpoint) -> io::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), checkpoint)?;
    Ok(())
}

/// Read a checkpoint back.
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> io::Result<Checkpoint> {
    let file = File::open(path)?;
    let checkpoint = serde_json::from_reader(BufReader::new(file))?;
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::train_sample;
    use ndarray::array;
    use std::env;

    #[test]
    fn test_checkpoint_round_trip() {
        let mut net = TritNet::new();
        net.add_layer(3, 5, 0.6).expect("layer 1");
        net.add_layer(5, 2, 1.0).expect("layer 2");
        net.set_learning_rate(0.03);

        train_sample(&mut net, &array![1.0, -1.0, 0.0], &array![1.0, -1.0]).expect("train");

        let path = env::temp_dir().join("tritnet_checkpoint_test.json");
        save_checkpoint(&path, &Checkpoint {
            epoch: 7,
            loss: 1.25,
            net: net.clone(),
        })
        .expect("save");

        let restored = load_checkpoint(&path).expect("load");
        std::fs::remove_file(&path).ok();

        assert_eq!(restored.epoch, 7);
        assert_eq!(restored.loss, 1.25);
        assert_eq!(restored.net.layers.len(), 2);
        assert_eq!(restored.net.layers[0].mask, net.layers[0].mask);
        assert_eq!(restored.net.layers[0].weight, net.layers[0].weight);

        let input = array![0.0, 1.0, -1.0];
        let expected = net.predict(&input).expect("predict original");
        let actual = restored.net.predict(&input).expect("predict restored");
        assert_eq!(expected, actual);
    }
}
