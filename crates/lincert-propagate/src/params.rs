//! Dense feed-forward network parameters.

use lincert_core::{LincertError, Result};
use ndarray::{arr2, Array1, Array2};
use serde::{Deserialize, Serialize};

/// One affine layer `z = W x + b` with `W` of shape `(out, in)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    weight: Array2<f64>,
    bias: Array1<f64>,
}

impl DenseLayer {
    pub fn new(weight: Array2<f64>, bias: Array1<f64>) -> Result<Self> {
        if bias.len() != weight.nrows() {
            return Err(LincertError::shape_mismatch(
                vec![weight.nrows()],
                vec![bias.len()],
            ));
        }
        if weight.is_empty() {
            return Err(LincertError::InvalidParams(format!(
                "weight matrix has empty shape {:?}",
                weight.shape()
            )));
        }
        if weight.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err(LincertError::InvalidParams(
                "weights and biases must be finite".to_string(),
            ));
        }
        Ok(Self { weight, bias })
    }

    pub fn weight(&self) -> &Array2<f64> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<f64> {
        &self.bias
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }
}

/// Network parameters: a non-empty chain of dense layers whose shapes agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParams", into = "RawParams")]
pub struct NNParams {
    layers: Vec<DenseLayer>,
}

/// JSON form: nested row-major arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawParams {
    biases: Vec<Vec<f64>>,
    weights: Vec<Vec<Vec<f64>>>,
}

impl NNParams {
    /// Build from parallel bias and weight sequences.
    pub fn new(biases: Vec<Array1<f64>>, weights: Vec<Array2<f64>>) -> Result<Self> {
        if biases.len() != weights.len() {
            return Err(LincertError::InvalidParams(format!(
                "{} bias vectors but {} weight matrices",
                biases.len(),
                weights.len()
            )));
        }
        let layers = weights
            .into_iter()
            .zip(biases)
            .enumerate()
            .map(|(i, (w, b))| DenseLayer::new(w, b).map_err(|e| e.in_layer(i)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_layers(layers)
    }

    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(LincertError::InvalidParams(
                "network must have at least one layer".to_string(),
            ));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.in_features() != prev.out_features() {
                return Err(LincertError::shape_mismatch(
                    vec![prev.out_features()],
                    vec![next.in_features()],
                )
                .in_layer(i + 1));
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&DenseLayer> {
        self.layers.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DenseLayer> {
        self.layers.iter()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].in_features()
    }

    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_features()
    }

    /// `[n_0, n_1, ..., n_L]`: input width followed by each layer's width.
    pub fn widths(&self) -> Vec<usize> {
        std::iter::once(self.input_dim())
            .chain(self.layers.iter().map(DenseLayer::out_features))
            .collect()
    }

    /// Total number of neurons over all layers (inputs excluded).
    pub fn neuron_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::out_features).sum()
    }
}

impl Default for NNParams {
    /// Single identity layer on two inputs with zero bias.
    fn default() -> Self {
        Self {
            layers: vec![DenseLayer {
                weight: arr2(&[[1.0, 0.0], [0.0, 1.0]]),
                bias: Array1::zeros(2),
            }],
        }
    }
}

impl<'a> IntoIterator for &'a NNParams {
    type Item = &'a DenseLayer;
    type IntoIter = std::slice::Iter<'a, DenseLayer>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}

impl TryFrom<RawParams> for NNParams {
    type Error = LincertError;

    fn try_from(raw: RawParams) -> Result<Self> {
        let mut weights = Vec::with_capacity(raw.weights.len());
        for (i, rows) in raw.weights.into_iter().enumerate() {
            let nrows = rows.len();
            let ncols = rows.first().map_or(0, Vec::len);
            if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
                return Err(
                    LincertError::shape_mismatch(vec![ncols], vec![bad.len()]).in_layer(i)
                );
            }
            let flat: Vec<f64> = rows.into_iter().flatten().collect();
            let w = Array2::from_shape_vec((nrows, ncols), flat)
                .map_err(|e| LincertError::InvalidParams(e.to_string()).in_layer(i))?;
            weights.push(w);
        }
        let biases = raw.biases.into_iter().map(Array1::from).collect();
        Self::new(biases, weights)
    }
}

impl From<NNParams> for RawParams {
    fn from(params: NNParams) -> Self {
        let (biases, weights) = params
            .layers
            .into_iter()
            .map(|layer| {
                let rows: Vec<Vec<f64>> = layer.weight.outer_iter().map(|r| r.to_vec()).collect();
                (layer.bias.to_vec(), rows)
            })
            .unzip();
        Self { biases, weights }
    }
}
