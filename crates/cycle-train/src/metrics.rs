//! Loss bookkeeping: per-iteration records, per-epoch means, run history.

use std::time::{Duration, Instant};

use cycle_core::CycleError;
use serde::{Deserialize, Serialize};

/// The six scalars recorded every iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LossKind {
    /// Discriminator A (judges B-domain images).
    #[serde(rename = "D_A_losses")]
    DA,
    /// Discriminator B (judges A-domain images).
    #[serde(rename = "D_B_losses")]
    DB,
    /// Adversarial loss of generator A (A→B).
    #[serde(rename = "G_A_losses")]
    GA,
    /// Adversarial loss of generator B (B→A).
    #[serde(rename = "G_B_losses")]
    GB,
    /// Weighted A→B→A reconstruction loss.
    #[serde(rename = "A_cycle_losses")]
    ACycle,
    /// Weighted B→A→B reconstruction loss.
    #[serde(rename = "B_cycle_losses")]
    BCycle,
}

impl LossKind {
    /// All kinds in log order.
    pub const ALL: [LossKind; 6] = [
        Self::DA,
        Self::DB,
        Self::GA,
        Self::GB,
        Self::ACycle,
        Self::BCycle,
    ];

    /// History key, e.g. `D_A_losses`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::DA => "D_A_losses",
            Self::DB => "D_B_losses",
            Self::GA => "G_A_losses",
            Self::GB => "G_B_losses",
            Self::ACycle => "A_cycle_losses",
            Self::BCycle => "B_cycle_losses",
        }
    }

    /// Short label used in the epoch log line, e.g. `D_A`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DA => "D_A",
            Self::DB => "D_B",
            Self::GA => "G_A",
            Self::GB => "G_B",
            Self::ACycle => "A_cycle",
            Self::BCycle => "B_cycle",
        }
    }
}

impl std::fmt::Display for LossKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One iteration's losses (or one epoch's means).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    /// Discriminator A loss.
    pub d_a: f32,
    /// Discriminator B loss.
    pub d_b: f32,
    /// Generator A adversarial loss.
    pub g_a: f32,
    /// Generator B adversarial loss.
    pub g_b: f32,
    /// Weighted A cycle loss.
    pub a_cycle: f32,
    /// Weighted B cycle loss.
    pub b_cycle: f32,
}

impl LossRecord {
    /// Value of one loss.
    pub fn get(&self, kind: LossKind) -> f32 {
        match kind {
            LossKind::DA => self.d_a,
            LossKind::DB => self.d_b,
            LossKind::GA => self.g_a,
            LossKind::GB => self.g_b,
            LossKind::ACycle => self.a_cycle,
            LossKind::BCycle => self.b_cycle,
        }
    }

    /// First NaN or infinite loss, in [`LossKind::ALL`] order.
    pub fn first_non_finite(&self) -> Option<(LossKind, f32)> {
        LossKind::ALL
            .iter()
            .map(|&k| (k, self.get(k)))
            .find(|(_, v)| !v.is_finite())
    }

    /// Generator objective: both adversarial terms plus both cycle terms.
    pub fn generator_total(&self) -> f32 {
        self.g_a + self.g_b + self.a_cycle + self.b_cycle
    }
}

/// Means and timing of one finished epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Iterations that contributed to the means.
    pub iterations: usize,
    /// Per-loss means.
    pub means: LossRecord,
    /// Wall-clock seconds spent in the epoch.
    pub duration_secs: f64,
}

impl EpochSummary {
    /// Reference-format log line.
    pub fn log_line(&self, total_epochs: usize) -> String {
        let m = &self.means;
        format!(
            "[{}/{}] - ptime: {:.2}, loss_D_A: {:.3}, loss_D_B: {:.3}, loss_G_A: {:.3}, loss_G_B: {:.3}, loss_A_cycle: {:.3}, loss_B_cycle: {:.3}",
            self.epoch,
            total_epochs,
            self.duration_secs,
            m.d_a,
            m.d_b,
            m.g_a,
            m.g_b,
            m.a_cycle,
            m.b_cycle
        )
    }
}

/// Running sums for the epoch in progress.
///
/// # Example
///
/// ```
/// use cycle_train::{EpochMeter, LossRecord};
///
/// let mut meter = EpochMeter::new(1);
/// meter.record(&LossRecord { d_a: 1.0, ..LossRecord::default() });
/// meter.record(&LossRecord { d_a: 3.0, ..LossRecord::default() });
/// let summary = meter.finish();
/// assert_eq!(summary.iterations, 2);
/// assert_eq!(summary.means.d_a, 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct EpochMeter {
    epoch: usize,
    sums: [f64; 6],
    count: usize,
    started: Instant,
}

impl EpochMeter {
    /// Starts timing 1-based epoch `epoch`.
    pub fn new(epoch: usize) -> Self {
        Self {
            epoch,
            sums: [0.0; 6],
            count: 0,
            started: Instant::now(),
        }
    }

    /// Adds one iteration.
    pub fn record(&mut self, record: &LossRecord) {
        for (sum, kind) in self.sums.iter_mut().zip(LossKind::ALL) {
            *sum += f64::from(record.get(kind));
        }
        self.count += 1;
    }

    /// Iterations recorded so far.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Closes the epoch using the measured wall-clock time.
    pub fn finish(self) -> EpochSummary {
        let elapsed = self.started.elapsed();
        self.finish_with(elapsed)
    }

    /// Closes the epoch with an explicit duration.
    pub fn finish_with(self, duration: Duration) -> EpochSummary {
        let n = self.count.max(1) as f64;
        let mean = |i: usize| (self.sums[i] / n) as f32;
        EpochSummary {
            epoch: self.epoch,
            iterations: self.count,
            means: LossRecord {
                d_a: mean(0),
                d_b: mean(1),
                g_a: mean(2),
                g_b: mean(3),
                a_cycle: mean(4),
                b_cycle: mean(5),
            },
            duration_secs: duration.as_secs_f64(),
        }
    }
}

/// One value per entry for each of the six losses, keyed like `train_hist`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossSeries {
    #[serde(rename = "D_A_losses")]
    d_a: Vec<f32>,
    #[serde(rename = "D_B_losses")]
    d_b: Vec<f32>,
    #[serde(rename = "G_A_losses")]
    g_a: Vec<f32>,
    #[serde(rename = "G_B_losses")]
    g_b: Vec<f32>,
    #[serde(rename = "A_cycle_losses")]
    a_cycle: Vec<f32>,
    #[serde(rename = "B_cycle_losses")]
    b_cycle: Vec<f32>,
}

impl LossSeries {
    /// Appends all six values of `record`.
    pub fn push(&mut self, record: &LossRecord) {
        for kind in LossKind::ALL {
            let value = record.get(kind);
            self.get_mut(kind).push(value);
        }
    }

    /// Values of one loss, oldest first.
    pub fn get(&self, kind: LossKind) -> &[f32] {
        match kind {
            LossKind::DA => &self.d_a,
            LossKind::DB => &self.d_b,
            LossKind::GA => &self.g_a,
            LossKind::GB => &self.g_b,
            LossKind::ACycle => &self.a_cycle,
            LossKind::BCycle => &self.b_cycle,
        }
    }

    fn get_mut(&mut self, kind: LossKind) -> &mut Vec<f32> {
        match kind {
            LossKind::DA => &mut self.d_a,
            LossKind::DB => &mut self.d_b,
            LossKind::GA => &mut self.g_a,
            LossKind::GB => &mut self.g_b,
            LossKind::ACycle => &mut self.a_cycle,
            LossKind::BCycle => &mut self.b_cycle,
        }
    }

    /// Entries per loss.
    pub fn len(&self) -> usize {
        self.d_a.len()
    }

    /// Returns `true` if nothing was pushed.
    pub fn is_empty(&self) -> bool {
        self.d_a.is_empty()
    }
}

/// Run-lifetime loss history, serialized as `train_hist.json`.
///
/// The top-level loss series hold one mean per finished epoch;
/// `per_iteration` holds every recorded iteration under the same keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainHistory {
    #[serde(flatten)]
    means: LossSeries,
    /// Every iteration's losses.
    #[serde(default)]
    pub per_iteration: LossSeries,
    /// Seconds per epoch.
    pub per_epoch_ptimes: Vec<f64>,
    /// Seconds for the whole run, set when the run ends.
    pub total_time: f64,
    /// Full per-epoch summaries.
    pub epochs: Vec<EpochSummary>,
}

impl TrainHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one iteration's losses.
    pub fn record_iteration(&mut self, record: &LossRecord) {
        self.per_iteration.push(record);
    }

    /// Appends a finished epoch.
    pub fn push_epoch(&mut self, summary: EpochSummary) {
        self.means.push(&summary.means);
        self.per_epoch_ptimes.push(summary.duration_secs);
        self.epochs.push(summary);
    }

    /// Per-epoch means of one loss.
    pub fn series(&self, kind: LossKind) -> &[f32] {
        self.means.get(kind)
    }

    /// Number of finished epochs.
    pub fn epochs_completed(&self) -> usize {
        self.epochs.len()
    }

    /// Most recent epoch, if any.
    pub fn last(&self) -> Option<&EpochSummary> {
        self.epochs.last()
    }

    /// Average epoch duration in seconds.
    pub fn mean_epoch_time(&self) -> Option<f64> {
        if self.per_epoch_ptimes.is_empty() {
            return None;
        }
        Some(self.per_epoch_ptimes.iter().sum::<f64>() / self.per_epoch_ptimes.len() as f64)
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Data`] if serialization fails.
    pub fn to_json(&self) -> Result<String, CycleError> {
        serde_json::to_string_pretty(self).map_err(|e| CycleError::Data {
            message: format!("serialize train history: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(v: f32) -> LossRecord {
        LossRecord {
            d_a: v,
            d_b: v + 1.0,
            g_a: v + 2.0,
            g_b: v + 3.0,
            a_cycle: v + 4.0,
            b_cycle: v + 5.0,
        }
    }

    #[test]
    fn kinds_have_distinct_keys() {
        let mut keys: Vec<&str> = LossKind::ALL.iter().map(|k| k.key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 6);
        assert_eq!(LossKind::ACycle.to_string(), "A_cycle_losses");
    }

    #[test]
    fn non_finite_detected_in_order() {
        let mut r = record(0.0);
        assert_eq!(r.first_non_finite(), None);
        r.g_b = f32::INFINITY;
        r.b_cycle = f32::NAN;
        assert_eq!(r.first_non_finite().map(|(k, _)| k), Some(LossKind::GB));
    }

    #[test]
    fn meter_means_per_kind() {
        let mut meter = EpochMeter::new(4);
        meter.record(&record(0.0));
        meter.record(&record(2.0));
        let s = meter.finish_with(Duration::from_millis(1500));
        assert_eq!(s.epoch, 4);
        assert_eq!(s.means, record(1.0));
        assert_eq!(s.duration_secs, 1.5);
    }

    #[test]
    fn empty_meter_yields_zero_means() {
        let meter = EpochMeter::new(1);
        assert!(meter.is_empty());
        let s = meter.finish_with(Duration::ZERO);
        assert_eq!(s.iterations, 0);
        assert_eq!(s.means, LossRecord::default());
    }

    #[test]
    fn history_appends_series_and_times() {
        let mut h = TrainHistory::new();
        assert_eq!(h.mean_epoch_time(), None);
        for (i, secs) in [1.0, 3.0].into_iter().enumerate() {
            let mut meter = EpochMeter::new(i + 1);
            meter.record(&record(i as f32));
            h.push_epoch(meter.finish_with(Duration::from_secs_f64(secs)));
        }
        assert_eq!(h.epochs_completed(), 2);
        assert_eq!(h.series(LossKind::DA), &[0.0, 1.0]);
        assert_eq!(h.series(LossKind::BCycle), &[5.0, 6.0]);
        assert_eq!(h.mean_epoch_time(), Some(2.0));
        assert_eq!(h.last().map(|s| s.epoch), Some(2));
    }

    #[test]
    fn json_uses_history_keys() {
        let mut h = TrainHistory::new();
        let mut meter = EpochMeter::new(1);
        meter.record(&record(0.5));
        h.push_epoch(meter.finish_with(Duration::from_secs(2)));
        h.total_time = 2.5;

        let json: serde_json::Value = serde_json::from_str(&h.to_json().unwrap()).unwrap();
        for kind in LossKind::ALL {
            assert!(json.get(kind.key()).is_some(), "missing {kind}");
        }
        assert_eq!(json["per_epoch_ptimes"][0], 2.0);
        assert_eq!(json["total_time"], 2.5);

        let back: TrainHistory = serde_json::from_value(json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn per_iteration_series_keep_every_record() {
        let mut h = TrainHistory::new();
        let mut meter = EpochMeter::new(1);
        for v in [0.0, 2.0, 4.0] {
            meter.record(&record(v));
            h.record_iteration(&record(v));
        }
        h.push_epoch(meter.finish_with(Duration::from_secs(1)));

        assert_eq!(h.per_iteration.len(), 3);
        assert_eq!(h.per_iteration.get(LossKind::GA), &[2.0, 4.0, 6.0]);
        assert_eq!(h.series(LossKind::GA), &[4.0]);

        let json: serde_json::Value = serde_json::from_str(&h.to_json().unwrap()).unwrap();
        assert_eq!(json["per_iteration"]["D_B_losses"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["D_B_losses"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn log_line_matches_reference_format() {
        let mut meter = EpochMeter::new(3);
        meter.record(&record(0.0));
        let line = meter.finish_with(Duration::from_millis(250)).log_line(200);
        assert!(line.starts_with("[3/200] - ptime: 0.25, loss_D_A: 0.000"));
        assert!(line.ends_with("loss_B_cycle: 5.000"));
    }
}
