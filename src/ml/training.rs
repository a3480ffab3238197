//! Neural network training loop
//!
//! Mini-batch Adam on the mean-absolute-error loss with a trailing
//! validation hold-out, per-epoch shuffling and early stopping on the
//! validation loss. The best weights seen are always restored.

use anyhow::Result;
use ndarray::{s, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};

use super::models::NeuralNetParams;
use super::neural::{mae_loss, Adam, FeedForwardNet};
use super::ModelError;

/// Per-epoch losses of one training run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    /// Epoch (0-based) whose weights were restored
    pub best_epoch: usize,
}

impl TrainingHistory {
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    pub fn best_val_loss(&self) -> Option<f64> {
        self.val_loss.get(self.best_epoch).copied()
    }
}

/// Patience counter over a monitored loss
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f64,
    best_epoch: usize,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f64::INFINITY,
            best_epoch: 0,
            wait: 0,
        }
    }

    /// Record a loss; returns true when it improves on the best so far
    pub fn record(&mut self, epoch: usize, loss: f64) -> bool {
        if loss < self.best {
            self.best = loss;
            self.best_epoch = epoch;
            self.wait = 0;
            true
        } else {
            self.wait += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.wait >= self.patience
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}

/// Row index where the trailing validation hold-out starts
pub fn validation_start(rows: usize, validation_split: f64) -> usize {
    (rows as f64 * (1.0 - validation_split)).floor() as usize
}

pub fn train_network(
    x: &Array2<f64>,
    y: &Array2<f64>,
    params: &NeuralNetParams,
    seed: u64,
) -> Result<(FeedForwardNet, TrainingHistory)> {
    let split = validation_start(x.nrows(), params.validation_split);
    if split == 0 || split == x.nrows() {
        return Err(ModelError::ValidationSplit {
            rows: x.nrows(),
            fraction: params.validation_split,
        }
        .into());
    }

    let x_train = x.slice(s![..split, ..]).to_owned();
    let y_train = y.slice(s![..split, ..]).to_owned();
    let x_val = x.slice(s![split.., ..]).to_owned();
    let y_val = y.slice(s![split.., ..]).to_owned();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut net = FeedForwardNet::new(x.ncols(), y.ncols(), params, &mut rng)?;
    let mut adam = Adam::new(&net, params.learning_rate);
    let mut stopper = EarlyStopping::new(params.patience);
    let mut best = net.clone();
    let mut history = TrainingHistory::default();
    let mut order: Vec<usize> = (0..split).collect();

    info!(
        train_rows = split,
        validation_rows = x.nrows() - split,
        parameters = net.num_parameters(),
        "training neural network"
    );

    for epoch in 0..params.max_epochs {
        order.shuffle(&mut rng);

        let mut epoch_loss = 0.0;
        for batch in order.chunks(params.batch_size) {
            let xb = x_train.select(Axis(0), batch);
            let yb = y_train.select(Axis(0), batch);

            let cache = net.forward_cached(&xb);
            let (loss, grad) = mae_loss(&cache.output, &yb);
            let grads = net.backward(&cache, &grad);
            adam.step(&mut net, &grads);
            epoch_loss += loss * batch.len() as f64;
        }
        epoch_loss /= split as f64;

        let (val_loss, _) = mae_loss(&net.forward(&x_val), &y_val);
        history.loss.push(epoch_loss);
        history.val_loss.push(val_loss);

        if stopper.record(epoch, val_loss) {
            best = net.clone();
        }
        if epoch % 100 == 0 {
            debug!(epoch, loss = epoch_loss, val_loss, "epoch finished");
        }
        if stopper.should_stop() {
            info!(epoch, best_epoch = stopper.best_epoch(), "early stopping");
            break;
        }
    }

    history.best_epoch = stopper.best_epoch();
    Ok((best, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn test_early_stopping_patience() {
        let mut stopper = EarlyStopping::new(2);
        assert!(stopper.record(0, 1.0));
        assert!(!stopper.record(1, 1.5));
        assert!(!stopper.should_stop());
        assert!(!stopper.record(2, 1.0));
        assert!(stopper.should_stop());
        assert_eq!(stopper.best_epoch(), 0);
    }

    #[test]
    fn test_validation_start_is_trailing_fraction() {
        assert_eq!(validation_start(100, 0.1), 90);
        assert_eq!(validation_start(15, 0.1), 13);
    }

    #[test]
    fn test_train_network_records_history() {
        let x = Array::from_shape_fn((40, 3), |(i, j)| ((i * (j + 1)) % 7) as f64 / 7.0);
        let y = x.sum_axis(Axis(1)).insert_axis(Axis(1));
        let params = NeuralNetParams {
            hidden_layers: 3,
            width: 8,
            max_epochs: 30,
            patience: 5,
            ..Default::default()
        };

        let (net, history) = train_network(&x, &y, &params, 42).unwrap();
        assert!(history.epochs() >= 1 && history.epochs() <= 30);
        assert_eq!(history.loss.len(), history.val_loss.len());
        assert!(history.best_epoch < history.epochs());

        // restored weights reproduce the best validation loss
        let x_val = x.slice(s![36.., ..]).to_owned();
        let y_val = y.slice(s![36.., ..]).to_owned();
        let (val_loss, _) = mae_loss(&net.forward(&x_val), &y_val);
        assert!((val_loss - history.best_val_loss().unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_too_few_rows_for_validation() {
        let x = Array2::zeros((1, 2));
        let y = Array2::zeros((1, 1));
        assert!(train_network(&x, &y, &NeuralNetParams::default(), 0).is_err());
    }
}
