//! Recurrent neural sequence model
//!
//! A three-layer LSTM stack (64, 32 and 16 units with decreasing dropout)
//! feeding two ReLU dense layers, trained with Adam on min-max scaled lookback
//! windows. Training uses an 80/10/10 split with early stopping and
//! learning-rate reduction on the validation loss. Forecasts roll the window
//! forward, injecting small noise into each fed-back prediction.
//!
//! The network is only compiled with the `neural` cargo feature. Without it
//! the strategy reports [`ForecastError::ModelUnavailable`]. Any failure
//! while training or predicting falls back to the linear trend.

use crate::config::NeuralConfig;
use crate::error::{ForecastError, Result};
use crate::models::{check_horizon, ForecastModel, ForecastResult, LinearTrendModel, StrategyKind};
use crate::series::ReturnSeries;
use tracing::warn;
use trade_math::MinMaxScaler;

/// Fewest training windows the network is trained on
const MIN_WINDOWS: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct NeuralModel {
    config: NeuralConfig,
}

/// Scaled lookback windows and their next-step targets
#[derive(Debug, Clone)]
pub struct Windows {
    pub inputs: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub scaler: MinMaxScaler,
    pub lookback: usize,
}

impl NeuralModel {
    pub fn new(config: NeuralConfig) -> Self {
        Self { config }
    }

    /// A quarter of the history, clamped to the configured bounds
    pub fn lookback_for(&self, len: usize) -> usize {
        (len / 4).clamp(self.config.min_lookback, self.config.max_lookback)
    }

    /// Scale `values` and cut them into overlapping lookback windows
    pub fn prepare_windows(&self, values: &[f64]) -> Result<Windows> {
        let lookback = self.lookback_for(values.len());
        if values.len() < lookback + 10 {
            return Err(ForecastError::InsufficientData(format!(
                "neural model needs at least {} observations, got {}",
                lookback + 10,
                values.len()
            )));
        }

        let scaler = MinMaxScaler::fit(values)?;
        let scaled = scaler.transform_all(values);
        let inputs: Vec<Vec<f64>> = (lookback..scaled.len())
            .map(|i| scaled[i - lookback..i].to_vec())
            .collect();
        let targets = scaled[lookback..].to_vec();

        if inputs.len() < MIN_WINDOWS {
            return Err(ForecastError::InsufficientData(format!(
                "neural model needs {} training windows, got {}",
                MIN_WINDOWS,
                inputs.len()
            )));
        }

        Ok(Windows {
            inputs,
            targets,
            scaler,
            lookback,
        })
    }

    #[cfg(feature = "neural")]
    fn train_and_predict(&self, values: &[f64], horizon: usize) -> Result<Vec<f64>> {
        let windows = self.prepare_windows(values)?;
        let last_window = windows.scaler.transform_all(&values[values.len() - windows.lookback..]);

        let session = network::Session::new()?;
        let scaled = session.train_and_forecast(&self.config, &windows, &last_window, horizon)?;
        // `session` drops here; its variables and graph go with it
        drop(session);

        Ok(windows.scaler.inverse_transform_all(&scaled))
    }

    #[cfg(not(feature = "neural"))]
    fn train_and_predict(&self, _values: &[f64], _horizon: usize) -> Result<Vec<f64>> {
        Err(unavailable())
    }
}

fn unavailable() -> ForecastError {
    ForecastError::ModelUnavailable(
        "neural strategy requires the `neural` feature".to_string(),
    )
}

impl ForecastModel for NeuralModel {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Neural
    }

    fn forecast(&self, series: &ReturnSeries, horizon: usize) -> Result<ForecastResult> {
        check_horizon(horizon)?;
        if !cfg!(feature = "neural") {
            return Err(unavailable());
        }

        match self.train_and_predict(series.values(), horizon) {
            Ok(values) => ForecastResult::new(StrategyKind::Neural, values, horizon),
            Err(e) => {
                warn!(error = %e, "neural model falling back to linear trend");
                let values = LinearTrendModel::extrapolate(series.values(), horizon)?;
                Ok(ForecastResult::new(StrategyKind::Neural, values, horizon)?
                    .with_fallback(StrategyKind::LinearTrend))
            }
        }
    }
}

#[cfg(feature = "neural")]
mod network {
    use super::Windows;
    use crate::config::NeuralConfig;
    use crate::error::{ForecastError, Result};
    use candle_core::{DType, Device, Tensor};
    use candle_nn::{
        linear, loss, lstm, ops, AdamW, LSTMConfig, Linear, Module, Optimizer, ParamsAdamW,
        VarBuilder, VarMap, LSTM, RNN,
    };
    use rand::seq::SliceRandom;
    use rand::thread_rng;
    use rand_distr::{Distribution, Normal};
    use tracing::debug;

    const LSTM_UNITS: [usize; 3] = [64, 32, 16];
    const LSTM_DROPOUT: [f32; 3] = [0.3, 0.2, 0.1];

    fn candle_err(e: candle_core::Error) -> ForecastError {
        ForecastError::ModelUnavailable(format!("neural network: {}", e))
    }

    struct Network {
        layers: Vec<LSTM>,
        hidden: Linear,
        narrow: Linear,
        output: Linear,
    }

    impl Network {
        fn new(vb: VarBuilder) -> candle_core::Result<Self> {
            let mut layers = Vec::with_capacity(LSTM_UNITS.len());
            let mut input = 1;
            for (i, &units) in LSTM_UNITS.iter().enumerate() {
                layers.push(lstm(input, units, LSTMConfig::default(), vb.pp(format!("lstm{}", i)))?);
                input = units;
            }
            Ok(Self {
                layers,
                hidden: linear(input, 32, vb.pp("dense32"))?,
                narrow: linear(32, 16, vb.pp("dense16"))?,
                output: linear(16, 1, vb.pp("output"))?,
            })
        }

        /// `(batch, lookback, 1)` to `(batch, 1)`
        fn forward(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
            let steps = xs.dim(1)?;
            let mut sequence = xs.clone();
            for (layer, &rate) in self.layers.iter().zip(LSTM_DROPOUT.iter()) {
                let states = layer.seq(&sequence)?;
                sequence = layer.states_to_tensor(&states)?;
                if train {
                    sequence = ops::dropout(&sequence, rate)?;
                }
            }
            let last = sequence.narrow(1, steps - 1, 1)?.squeeze(1)?;
            let h = self.hidden.forward(&last)?.relu()?;
            let h = self.narrow.forward(&h)?.relu()?;
            self.output.forward(&h)
        }
    }

    /// Owns every tensor the network allocates. Dropping it releases them.
    pub(super) struct Session {
        device: Device,
        varmap: VarMap,
        network: Network,
    }

    impl Drop for Session {
        fn drop(&mut self) {
            debug!("neural session released");
        }
    }

    impl Session {
        pub(super) fn new() -> Result<Self> {
            let device = Device::Cpu;
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            let network = Network::new(vb).map_err(candle_err)?;
            Ok(Self {
                device,
                varmap,
                network,
            })
        }

        fn batch(&self, windows: &Windows, indices: &[usize]) -> candle_core::Result<(Tensor, Tensor)> {
            let lookback = windows.lookback;
            let inputs: Vec<f32> = indices
                .iter()
                .flat_map(|&i| windows.inputs[i].iter().map(|v| *v as f32))
                .collect();
            let targets: Vec<f32> = indices.iter().map(|&i| windows.targets[i] as f32).collect();
            let xs = Tensor::from_vec(inputs, (indices.len(), lookback, 1), &self.device)?;
            let ys = Tensor::from_vec(targets, (indices.len(), 1), &self.device)?;
            Ok((xs, ys))
        }

        fn loss_on(&self, windows: &Windows, indices: &[usize]) -> candle_core::Result<f32> {
            let (xs, ys) = self.batch(windows, indices)?;
            let predictions = self.network.forward(&xs, false)?;
            loss::mse(&predictions, &ys)?.to_scalar::<f32>()
        }

        fn snapshot(&self) -> candle_core::Result<Vec<Tensor>> {
            self.varmap
                .all_vars()
                .iter()
                .map(|var| var.as_tensor().copy())
                .collect()
        }

        fn restore(&self, snapshot: &[Tensor]) -> candle_core::Result<()> {
            for (var, saved) in self.varmap.all_vars().iter().zip(snapshot) {
                var.set(saved)?;
            }
            Ok(())
        }

        /// Train on `windows`, then roll `last_window` forward `horizon`
        /// steps. Inputs and outputs are in scaled units.
        pub(super) fn train_and_forecast(
            &self,
            config: &NeuralConfig,
            windows: &Windows,
            last_window: &[f64],
            horizon: usize,
        ) -> Result<Vec<f64>> {
            self.train(config, windows).map_err(candle_err)?;
            self.roll_forward(config, last_window, horizon)
                .map_err(candle_err)
        }

        fn train(&self, config: &NeuralConfig, windows: &Windows) -> candle_core::Result<()> {
            let total = windows.inputs.len();
            let train_len = total * 8 / 10;
            let val_len = total / 10;
            let train_idx: Vec<usize> = (0..train_len).collect();
            let val_idx: Vec<usize> = (train_len..train_len + val_len).collect();

            let mut learning_rate = config.learning_rate;
            let mut optimizer = AdamW::new(
                self.varmap.all_vars(),
                ParamsAdamW {
                    lr: learning_rate,
                    weight_decay: 0.0,
                    ..ParamsAdamW::default()
                },
            )?;

            let batch_size = config.batch_size.min(train_len).max(1);
            // without a validation split there is nothing to stop on
            let epochs = if val_idx.is_empty() {
                config.epochs / 2
            } else {
                config.epochs
            };

            let mut rng = thread_rng();
            let mut order = train_idx.clone();
            let mut best_loss = f32::INFINITY;
            let mut best_weights = None;
            let mut since_best = 0;
            let mut since_lr_drop = 0;

            for epoch in 0..epochs {
                order.shuffle(&mut rng);
                for chunk in order.chunks(batch_size) {
                    let (xs, ys) = self.batch(windows, chunk)?;
                    let predictions = self.network.forward(&xs, true)?;
                    let batch_loss = loss::mse(&predictions, &ys)?;
                    optimizer.backward_step(&batch_loss)?;
                }

                if val_idx.is_empty() {
                    continue;
                }
                let val_loss = self.loss_on(windows, &val_idx)?;
                if val_loss < best_loss {
                    best_loss = val_loss;
                    best_weights = Some(self.snapshot()?);
                    since_best = 0;
                    since_lr_drop = 0;
                } else {
                    since_best += 1;
                    since_lr_drop += 1;
                }

                if since_lr_drop >= config.lr_patience {
                    learning_rate *= config.lr_factor;
                    optimizer.set_learning_rate(learning_rate);
                    since_lr_drop = 0;
                    debug!(epoch, learning_rate, "reduced learning rate on plateau");
                }
                if since_best >= config.early_stopping_patience {
                    debug!(epoch, best_loss, "early stopping");
                    break;
                }
            }

            if let Some(weights) = best_weights {
                self.restore(&weights)?;
            }

            let test_idx: Vec<usize> = (train_len + val_len..total).collect();
            if !test_idx.is_empty() {
                let test_loss = self.loss_on(windows, &test_idx)?;
                debug!(test_loss, "neural model evaluated on held-out windows");
            }
            Ok(())
        }

        fn roll_forward(
            &self,
            config: &NeuralConfig,
            last_window: &[f64],
            horizon: usize,
        ) -> candle_core::Result<Vec<f64>> {
            let noise = Normal::new(0.0, config.noise_std)
                .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
            let mut rng = thread_rng();
            let mut window: Vec<f32> = last_window.iter().map(|v| *v as f32).collect();
            let lookback = window.len();
            let mut predictions = Vec::with_capacity(horizon);

            for _ in 0..horizon {
                let xs = Tensor::from_vec(window.clone(), (1, lookback, 1), &self.device)?;
                let next = self
                    .network
                    .forward(&xs, false)?
                    .flatten_all()?
                    .to_vec1::<f32>()?
                    .first()
                    .copied()
                    .ok_or_else(|| candle_core::Error::Msg("empty prediction".to_string()))?;
                predictions.push(next as f64);

                window.remove(0);
                window.push(next + noise.sample(&mut rng) as f32);
            }
            Ok(predictions)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_lookback_is_clamped() {
        let model = NeuralModel::default();
        assert_eq!(model.lookback_for(20), 10);
        assert_eq!(model.lookback_for(80), 20);
        assert_eq!(model.lookback_for(500), 30);
    }

    #[test]
    fn test_prepare_windows() {
        let model = NeuralModel::default();
        let values: Vec<f64> = (0..60).map(|i| (i as f64 * 0.3).sin() * 0.02).collect();
        let windows = model.prepare_windows(&values).unwrap();

        assert_eq!(windows.lookback, 15);
        assert_eq!(windows.inputs.len(), 45);
        assert!(windows
            .inputs
            .iter()
            .flatten()
            .all(|v| (0.0..=1.0).contains(v)));

        // 29 points give a lookback of 10 and only 19 windows
        assert!(model.prepare_windows(&values[..29]).is_err());
    }

    #[cfg(not(feature = "neural"))]
    #[test]
    fn test_unavailable_without_feature() {
        let series = ReturnSeries::daily(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            vec![0.01; 50],
        )
        .unwrap();
        assert!(matches!(
            NeuralModel::default().forecast(&series, 5),
            Err(ForecastError::ModelUnavailable(_))
        ));
    }

    #[cfg(feature = "neural")]
    #[test]
    fn test_short_history_falls_back_to_trend() {
        let series = ReturnSeries::daily(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            vec![0.01, 0.02, 0.03, 0.04, 0.05],
        )
        .unwrap();
        let result = NeuralModel::default().forecast(&series, 3).unwrap();
        assert_eq!(result.fallback(), Some(StrategyKind::LinearTrend));
        assert_eq!(result.horizon(), 3);
    }
}
