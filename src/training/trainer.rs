//! Training loop and loss computation

use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};

use crate::data::dataset::{SequenceWindower, WindowBatch, WindowBatcher};
use crate::features::SafeScaler;
use crate::model::StatLstm;
use crate::training::metrics::{StatMetrics, TrainingHistory};
use crate::{HockeyError, Result, TrainingConfig};

/// Mean squared error with a weight per target column
#[derive(Debug, Clone)]
pub struct WeightedMseLoss {
    weights: Vec<f32>,
}

impl WeightedMseLoss {
    pub fn new(weights: Vec<f32>) -> Self {
        WeightedMseLoss { weights }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// predictions, targets: [batch, targets]
    pub fn forward<B: Backend>(&self, predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        let weights = Tensor::<B, 1>::from_floats(self.weights.as_slice(), &predictions.device())
            .unsqueeze::<2>();
        ((predictions - targets).powf_scalar(2.0) * weights).mean()
    }
}

/// Trainer for the StatLstm model
pub struct Trainer<B: AutodiffBackend> {
    model: StatLstm<B>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<burn::optim::Adam, StatLstm<B>, B>,
    loss_fn: WeightedMseLoss,
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    pub fn new(model: StatLstm<B>, config: &TrainingConfig, target_columns: &[String], device: B::Device) -> Self {
        let loss_fn = WeightedMseLoss::new(config.weights_for(target_columns));
        log::debug!("Loss weights: {:?}", loss_fn.weights());

        Trainer {
            model,
            optimizer: AdamConfig::new().init(),
            loss_fn,
            config: config.clone(),
            device,
        }
    }

    /// Train on `windows`; returns the best model and the per-epoch history.
    ///
    /// With a validation holdout the model with the lowest validation loss is kept,
    /// otherwise the model after the final epoch.
    pub fn train(mut self, windows: &SequenceWindower) -> Result<(StatLstm<B>, TrainingHistory)> {
        let (train_set, val_set) =
            windows.split_by_entity(self.config.validation_fraction, self.config.seed);
        if train_set.is_empty() {
            return Err(HockeyError::Model("no training windows".to_string()));
        }
        let has_validation = !val_set.is_empty();
        let target_columns = windows.target_columns().to_vec();
        let target_scaler = windows.target_scaler().clone();

        let train_loader = DataLoaderBuilder::new(WindowBatcher::<B>::new(self.device.clone()))
            .batch_size(self.config.batch_size.max(1))
            .shuffle(self.config.seed)
            .build(train_set);
        let val_loader = DataLoaderBuilder::new(WindowBatcher::<B>::new(self.device.clone()))
            .batch_size(self.config.batch_size.max(1))
            .build(val_set);

        let mut history = TrainingHistory::new();
        let mut best_model = None;

        log::info!(
            "Starting training for {} epochs on {} windows (lr={}, batch={})",
            self.config.epochs,
            windows.len(),
            self.config.learning_rate,
            self.config.batch_size
        );

        for epoch in 0..self.config.epochs {
            let train_metrics = self.train_epoch(train_loader.iter(), &target_columns, &target_scaler)?;
            let val_metrics = if has_validation {
                Some(self.evaluate(val_loader.iter(), &target_columns, &target_scaler)?)
            } else {
                None
            };

            let improved = history.record_epoch(epoch, &train_metrics, val_metrics.as_ref());
            match &val_metrics {
                Some(val) => log::info!(
                    "Epoch {}/{}: Train: {} | Val: {}",
                    epoch + 1,
                    self.config.epochs,
                    train_metrics,
                    val
                ),
                None => log::info!("Epoch {}/{}: {}", epoch + 1, self.config.epochs, train_metrics),
            }

            if improved {
                best_model = Some(self.model.clone());
                log::debug!("  New best model (val_loss: {:.4})", history.best_val_loss);
            }
        }

        Ok((best_model.unwrap_or(self.model), history))
    }

    fn train_epoch(
        &mut self,
        loader: impl Iterator<Item = WindowBatch<B>>,
        target_columns: &[String],
        target_scaler: &SafeScaler,
    ) -> Result<StatMetrics> {
        let mut metrics = StatMetrics::new(target_columns);

        for batch in loader {
            let predictions = self.model.forward(batch.features);
            let loss = self.loss_fn.forward(predictions.clone(), batch.targets.clone());
            let loss_val: f32 = loss.clone().into_scalar().elem();

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            let width = target_columns.len();
            metrics.update(
                loss_val,
                &descale(target_scaler, predictions.into_data().to_vec::<f32>(), width)?,
                &descale(target_scaler, batch.targets.into_data().to_vec::<f32>(), width)?,
            );
        }

        Ok(metrics)
    }

    /// Loss and real-unit MAE without gradient tracking or dropout
    fn evaluate(
        &self,
        loader: impl Iterator<Item = WindowBatch<B>>,
        target_columns: &[String],
        target_scaler: &SafeScaler,
    ) -> Result<StatMetrics> {
        let model = self.model.valid();
        let mut metrics = StatMetrics::new(target_columns);

        for batch in loader {
            let targets = batch.targets.inner();
            let predictions = model.forward(batch.features.inner());
            let loss_val: f32 = self
                .loss_fn
                .forward(predictions.clone(), targets.clone())
                .into_scalar()
                .elem();

            let width = target_columns.len();
            metrics.update(
                loss_val,
                &descale(target_scaler, predictions.into_data().to_vec::<f32>(), width)?,
                &descale(target_scaler, targets.into_data().to_vec::<f32>(), width)?,
            );
        }

        Ok(metrics)
    }
}

/// Flat [batch * width] scaled values to de-scaled rows
fn descale<E: std::fmt::Debug>(
    scaler: &SafeScaler,
    flat: std::result::Result<Vec<f32>, E>,
    width: usize,
) -> Result<Vec<Vec<f64>>> {
    let flat = flat.map_err(|e| HockeyError::Model(format!("tensor conversion failed: {:?}", e)))?;
    flat.chunks(width.max(1))
        .map(|row| {
            let row: Vec<f64> = row.iter().map(|&v| v as f64).collect();
            scaler.inverse_transform(&row)
        })
        .collect()
}
