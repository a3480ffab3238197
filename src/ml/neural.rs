//! Dense feed-forward network
//!
//! Plain ndarray implementation: dense layers with leaky-ReLU/ReLU hidden
//! activations and a linear output layer, trained with Adam on the
//! mean-absolute-error loss (see [`super::training`]).

use anyhow::Result;
use ndarray::{Array1, Array2, Axis};
use rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand::Rng;

use super::models::{Activation, NeuralNetParams};
use super::{ModelError, Regressor};

/// Weight initialisation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    HeNormal,
    HeUniform,
}

/// Activation applied after the affine map
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerActivation {
    LeakyRelu(f64),
    Relu,
    Linear,
}

impl LayerActivation {
    fn hidden(params: &NeuralNetParams) -> Self {
        match params.activation {
            Activation::LeakyRelu => Self::LeakyRelu(params.leaky_alpha),
            Activation::Relu => Self::Relu,
        }
    }

    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match *self {
            Self::LeakyRelu(alpha) => z.mapv(|v| if v > 0.0 { v } else { alpha * v }),
            Self::Relu => z.mapv(|v| v.max(0.0)),
            Self::Linear => z.clone(),
        }
    }

    fn derivative(&self, z: &Array2<f64>) -> Array2<f64> {
        match *self {
            Self::LeakyRelu(alpha) => z.mapv(|v| if v > 0.0 { 1.0 } else { alpha }),
            Self::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Self::Linear => Array2::ones(z.dim()),
        }
    }
}

/// Fully connected layer, `output = act(input · W + b)`
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    pub weights: Array2<f64>,
    pub biases: Array1<f64>,
    pub activation: LayerActivation,
}

impl DenseLayer {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: LayerActivation,
        init: Init,
        rng: &mut R,
    ) -> Result<Self> {
        let fan_in = input_size.max(1) as f64;
        let weights = match init {
            Init::HeNormal => {
                let normal = Normal::new(0.0, (2.0 / fan_in).sqrt())
                    .map_err(|e| anyhow::anyhow!("invalid He-normal deviation: {e}"))?;
                Array2::random_using((input_size, output_size), normal, rng)
            }
            Init::HeUniform => {
                let limit = (6.0 / fan_in).sqrt();
                Array2::random_using((input_size, output_size), Uniform::new(-limit, limit), rng)
            }
        };

        Ok(Self {
            weights,
            biases: Array1::zeros(output_size),
            activation,
        })
    }

    fn pre_activation(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weights) + &self.biases
    }

    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        self.activation.apply(&self.pre_activation(input))
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

/// Cached activations of one forward pass
pub struct ForwardCache {
    inputs: Vec<Array2<f64>>,
    pre_activations: Vec<Array2<f64>>,
    pub output: Array2<f64>,
}

/// Parameter gradients, one entry per layer
pub struct Gradients {
    pub weights: Vec<Array2<f64>>,
    pub biases: Vec<Array1<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardNet {
    layers: Vec<DenseLayer>,
}

impl FeedForwardNet {
    /// `hidden_layers` hidden layers of `width` units plus a linear output
    /// layer. The first layer is He-normal initialised, the rest He-uniform.
    pub fn new<R: Rng + ?Sized>(
        n_inputs: usize,
        n_outputs: usize,
        params: &NeuralNetParams,
        rng: &mut R,
    ) -> Result<Self> {
        let hidden = LayerActivation::hidden(params);
        let mut layers = Vec::with_capacity(params.hidden_layers + 1);
        let mut fan_in = n_inputs;

        for i in 0..params.hidden_layers {
            let init = if i == 0 { Init::HeNormal } else { Init::HeUniform };
            layers.push(DenseLayer::new(fan_in, params.width, hidden, init, rng)?);
            fan_in = params.width;
        }
        layers.push(DenseLayer::new(
            fan_in,
            n_outputs,
            LayerActivation::Linear,
            Init::HeUniform,
            rng,
        )?);

        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [DenseLayer] {
        &mut self.layers
    }

    pub fn n_inputs(&self) -> usize {
        self.layers.first().map_or(0, |l| l.weights.nrows())
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(DenseLayer::num_parameters).sum()
    }

    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        self.layers
            .iter()
            .fold(input.clone(), |acc, layer| layer.forward(&acc))
    }

    pub fn forward_cached(&self, input: &Array2<f64>) -> ForwardCache {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut current = input.clone();

        for layer in &self.layers {
            let z = layer.pre_activation(&current);
            let next = layer.activation.apply(&z);
            inputs.push(current);
            pre_activations.push(z);
            current = next;
        }

        ForwardCache {
            inputs,
            pre_activations,
            output: current,
        }
    }

    /// Backpropagate `output_gradient` (dLoss/dOutput) through the cached pass
    pub fn backward(&self, cache: &ForwardCache, output_gradient: &Array2<f64>) -> Gradients {
        let n = self.layers.len();
        let mut weights = Vec::with_capacity(n);
        let mut biases = Vec::with_capacity(n);
        let mut grad = output_gradient.clone();

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let delta = grad * layer.activation.derivative(&cache.pre_activations[i]);
            weights.push(cache.inputs[i].t().dot(&delta));
            biases.push(delta.sum_axis(Axis(0)));
            grad = delta.dot(&layer.weights.t());
        }

        weights.reverse();
        biases.reverse();
        Gradients { weights, biases }
    }
}

impl Regressor for FeedForwardNet {
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_inputs() {
            return Err(ModelError::WidthMismatch {
                expected: self.n_inputs(),
                found: x.ncols(),
            }
            .into());
        }
        Ok(self.forward(x))
    }
}

/// Adam optimiser state over every layer of a network
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m_w: Vec<Array2<f64>>,
    v_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_b: Vec<Array1<f64>>,
}

impl Adam {
    pub fn new(net: &FeedForwardNet, learning_rate: f64) -> Self {
        let zeros_w: Vec<Array2<f64>> = net
            .layers()
            .iter()
            .map(|l| Array2::zeros(l.weights.dim()))
            .collect();
        let zeros_b: Vec<Array1<f64>> = net
            .layers()
            .iter()
            .map(|l| Array1::zeros(l.biases.len()))
            .collect();

        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            m_w: zeros_w.clone(),
            v_w: zeros_w,
            m_b: zeros_b.clone(),
            v_b: zeros_b,
        }
    }

    pub fn step(&mut self, net: &mut FeedForwardNet, grads: &Gradients) {
        self.t += 1;
        let (b1, b2) = (self.beta1, self.beta2);
        let correction1 = 1.0 - b1.powi(self.t);
        let correction2 = 1.0 - b2.powi(self.t);
        let lr = self.learning_rate;
        let eps = self.epsilon;

        for (i, layer) in net.layers_mut().iter_mut().enumerate() {
            let gw = &grads.weights[i];
            self.m_w[i] = &self.m_w[i] * b1 + gw * (1.0 - b1);
            self.v_w[i] = &self.v_w[i] * b2 + &(gw * gw) * (1.0 - b2);
            ndarray::Zip::from(&mut layer.weights)
                .and(&self.m_w[i])
                .and(&self.v_w[i])
                .for_each(|w, &m, &v| {
                    *w -= lr * (m / correction1) / ((v / correction2).sqrt() + eps);
                });

            let gb = &grads.biases[i];
            self.m_b[i] = &self.m_b[i] * b1 + gb * (1.0 - b1);
            self.v_b[i] = &self.v_b[i] * b2 + &(gb * gb) * (1.0 - b2);
            ndarray::Zip::from(&mut layer.biases)
                .and(&self.m_b[i])
                .and(&self.v_b[i])
                .for_each(|b, &m, &v| {
                    *b -= lr * (m / correction1) / ((v / correction2).sqrt() + eps);
                });
        }
    }
}

/// Mean absolute error and its gradient with respect to `predicted`
pub fn mae_loss(predicted: &Array2<f64>, target: &Array2<f64>) -> (f64, Array2<f64>) {
    let diff = predicted - target;
    let count = diff.len().max(1) as f64;
    let loss = diff.mapv(f64::abs).sum() / count;
    let grad = diff.mapv(|d| {
        if d > 0.0 {
            1.0 / count
        } else if d < 0.0 {
            -1.0 / count
        } else {
            0.0
        }
    });
    (loss, grad)
}
