//! Loss curves rendered to PNG.

use std::ops::Range;
use std::path::Path;

use cycle_core::CycleError;
use plotters::prelude::*;

use crate::metrics::{LossKind, LossSeries, TrainHistory};

const PLOT_SIZE: (u32, u32) = (960, 540);

/// Line colour of each loss, in [`LossKind::ALL`] order.
pub const SERIES_COLORS: [RGBColor; 6] = [
    RGBColor(214, 39, 40),
    RGBColor(31, 119, 180),
    RGBColor(44, 160, 44),
    RGBColor(255, 127, 14),
    RGBColor(148, 103, 189),
    RGBColor(23, 190, 207),
];

fn value_range(series: &LossSeries) -> Range<f32> {
    let (lo, hi) = LossKind::ALL
        .iter()
        .flat_map(|&k| series.get(k).iter().copied())
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return 0.0..1.0;
    }
    if hi - lo < 1e-6 {
        return (lo - 0.5)..(hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad)..(hi + pad)
}

/// Draws the six per-iteration loss curves of `history` to `path`, one line
/// per loss coloured by [`SERIES_COLORS`]. Falls back to the per-epoch means
/// when no iterations were recorded.
///
/// # Errors
///
/// Returns [`CycleError::Io`] if the image cannot be drawn or written.
pub fn plot_history(history: &TrainHistory, path: &Path) -> Result<(), CycleError> {
    let plot_err = |message: String| CycleError::io(path, message);

    let means;
    let series = if history.per_iteration.is_empty() {
        let mut by_epoch = LossSeries::default();
        for summary in &history.epochs {
            by_epoch.push(&summary.means);
        }
        means = by_epoch;
        &means
    } else {
        &history.per_iteration
    };

    let steps = series.len().max(2) as f32;
    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| plot_err(e.to_string()))?;
    let mut chart = ChartBuilder::on(&root)
        .margin(24)
        .build_cartesian_2d(0f32..(steps - 1.0), value_range(series))
        .map_err(|e| plot_err(e.to_string()))?;

    for (kind, color) in LossKind::ALL.into_iter().zip(SERIES_COLORS) {
        let points = series
            .get(kind)
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, &v)| (i as f32, v));
        chart
            .draw_series(LineSeries::new(points, &color))
            .map_err(|e| plot_err(e.to_string()))?;
    }

    root.present().map_err(|e| plot_err(e.to_string()))?;
    tracing::debug!(path = %path.display(), points = series.len(), "plotted loss history");
    Ok(())
}
