//! Training metrics and evaluation

use std::fmt;

/// Loss and per-target mean absolute error, accumulated over batches
#[derive(Debug, Clone, Default)]
pub struct StatMetrics {
    /// Target column names, in model output order
    pub target_columns: Vec<String>,
    /// Sum of batch losses (normalized space)
    pub total_loss: f64,
    pub batch_count: usize,
    /// Sum of absolute errors per target, in real units
    pub abs_error_sums: Vec<f64>,
    pub sample_count: usize,
}

impl StatMetrics {
    pub fn new(target_columns: &[String]) -> Self {
        StatMetrics {
            target_columns: target_columns.to_vec(),
            abs_error_sums: vec![0.0; target_columns.len()],
            ..Self::default()
        }
    }

    /// Record one batch; `predictions` and `targets` are de-scaled rows
    pub fn update(&mut self, loss: f32, predictions: &[Vec<f64>], targets: &[Vec<f64>]) {
        self.total_loss += loss as f64;
        self.batch_count += 1;
        for (pred, target) in predictions.iter().zip(targets) {
            for (sum, (p, t)) in self.abs_error_sums.iter_mut().zip(pred.iter().zip(target)) {
                *sum += (p - t).abs();
            }
            self.sample_count += 1;
        }
    }

    pub fn avg_loss(&self) -> f64 {
        if self.batch_count == 0 {
            0.0
        } else {
            self.total_loss / self.batch_count as f64
        }
    }

    /// Mean absolute error per target column, in real units
    pub fn mae(&self) -> Vec<f64> {
        let n = self.sample_count.max(1) as f64;
        self.abs_error_sums.iter().map(|s| s / n).collect()
    }
}

impl fmt::Display for StatMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loss: {:.4} | MAE", self.avg_loss())?;
        for (col, mae) in self.target_columns.iter().zip(self.mae()) {
            write!(f, " {}={:.3}", col, mae)?;
        }
        Ok(())
    }
}

/// Training history for tracking progress
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    /// Per-epoch MAE per target on the evaluation set
    pub maes: Vec<Vec<f64>>,
    pub best_val_loss: f64,
    pub best_epoch: usize,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self {
            best_val_loss: f64::INFINITY,
            ..Default::default()
        }
    }

    /// Record an epoch; returns true when `val` is the best validation loss so far
    pub fn record_epoch(&mut self, epoch: usize, train: &StatMetrics, val: Option<&StatMetrics>) -> bool {
        self.train_losses.push(train.avg_loss());
        let eval = val.unwrap_or(train);
        self.maes.push(eval.mae());

        let Some(val) = val else {
            self.best_epoch = epoch;
            return false;
        };
        self.val_losses.push(val.avg_loss());
        if val.avg_loss() < self.best_val_loss {
            self.best_val_loss = val.avg_loss();
            self.best_epoch = epoch;
            return true;
        }
        false
    }

    /// Final per-target MAE
    pub fn last_mae(&self) -> Option<&[f64]> {
        self.maes.last().map(|m| m.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["goals".to_string(), "shots".to_string()]
    }

    #[test]
    fn test_mae_per_target() {
        let mut metrics = StatMetrics::new(&columns());
        metrics.update(0.5, &[vec![1.0, 3.0], vec![0.0, 2.0]], &[vec![0.0, 3.0], vec![1.0, 4.0]]);
        metrics.update(1.5, &[vec![2.0, 2.0]], &[vec![2.0, 1.0]]);

        assert_eq!(metrics.sample_count, 3);
        assert!((metrics.avg_loss() - 1.0).abs() < 1e-12);
        let mae = metrics.mae();
        assert_eq!(mae.len(), 2);
        assert!((mae[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((mae[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_history_tracks_best_validation() {
        let mut history = TrainingHistory::new();
        let mut train = StatMetrics::new(&columns());
        train.update(1.0, &[], &[]);
        let mut worse = StatMetrics::new(&columns());
        worse.update(2.0, &[], &[]);
        let mut better = StatMetrics::new(&columns());
        better.update(0.5, &[], &[]);

        assert!(history.record_epoch(0, &train, Some(&worse)));
        assert!(history.record_epoch(1, &train, Some(&better)));
        assert!(!history.record_epoch(2, &train, Some(&worse)));
        assert_eq!(history.best_epoch, 1);
        assert_eq!(history.val_losses.len(), 3);
    }

    #[test]
    fn test_history_without_validation_keeps_last_epoch() {
        let mut history = TrainingHistory::new();
        let train = StatMetrics::new(&columns());

        assert!(!history.record_epoch(0, &train, None));
        assert!(!history.record_epoch(1, &train, None));
        assert_eq!(history.best_epoch, 1);
        assert!(history.val_losses.is_empty());
        assert_eq!(history.last_mae(), Some(&[0.0, 0.0][..]));
    }
}
