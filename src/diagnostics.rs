//! SVG diagnostics
//!
//! Predicted-vs-actual scatter plots with a y = x reference line, and the
//! training/validation loss curve of neural network runs. Every artifact of
//! a run lands in `<diagnostics_dir>/<run_id>/`.

use anyhow::{Context, Result};
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::ml::TrainingHistory;

const PLOT_SIZE: (u32, u32) = (800, 800);
const CURVE_SIZE: (u32, u32) = (1000, 600);

fn plot_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow::anyhow!("plot rendering failed: {e}")
}

/// Shared axis range over both series, padded by 5 %
pub fn axis_range(actual: &[f64], predicted: &[f64]) -> (f64, f64) {
    let (lo, hi) = actual
        .iter()
        .chain(predicted.iter())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-6);
    (lo - pad, hi + pad)
}

/// Output directory of one run
#[derive(Debug, Clone)]
pub struct Diagnostics {
    dir: PathBuf,
    run_id: String,
}

impl Diagnostics {
    pub fn create(base: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let dir = base.join(&run_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self { dir, run_id })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Scatter of one target column; non-finite points are left out
    pub fn scatter(&self, name: &str, title: &str, actual: &[f64], predicted: &[f64]) -> Result<PathBuf> {
        let path = self.dir.join(format!("{name}.svg"));
        let (lo, hi) = axis_range(actual, predicted);
        {
            let root = SVGBackend::new(&path, PLOT_SIZE).into_drawing_area();
            root.fill(&WHITE).map_err(plot_err)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(title, ("sans-serif", 22))
                .margin(20)
                .x_label_area_size(45)
                .y_label_area_size(55)
                .build_cartesian_2d(lo..hi, lo..hi)
                .map_err(plot_err)?;
            chart
                .configure_mesh()
                .x_desc("actual")
                .y_desc("predicted")
                .draw()
                .map_err(plot_err)?;

            chart
                .draw_series(
                    actual
                        .iter()
                        .zip(predicted.iter())
                        .filter(|(a, p)| a.is_finite() && p.is_finite())
                        .map(|(a, p)| Circle::new((*a, *p), 2, BLUE.mix(0.5).filled())),
                )
                .map_err(plot_err)?;
            chart
                .draw_series(LineSeries::new(vec![(lo, lo), (hi, hi)], &RED))
                .map_err(plot_err)?;

            root.present().map_err(plot_err)?;
        }
        info!(path = %path.display(), points = actual.len(), "scatter plot written");
        Ok(path)
    }

    pub fn loss_curve(&self, history: &TrainingHistory) -> Result<PathBuf> {
        let path = self.dir.join("loss.svg");
        let epochs = history.epochs().max(1) as f64;
        let top = history
            .loss
            .iter()
            .chain(history.val_loss.iter())
            .filter(|v| v.is_finite())
            .fold(0.0f64, |acc, v| acc.max(*v))
            .max(1e-6);
        {
            let root = SVGBackend::new(&path, CURVE_SIZE).into_drawing_area();
            root.fill(&WHITE).map_err(plot_err)?;

            let mut chart = ChartBuilder::on(&root)
                .caption("training loss (MAE)", ("sans-serif", 22))
                .margin(20)
                .x_label_area_size(45)
                .y_label_area_size(60)
                .build_cartesian_2d(0.0..epochs, 0.0..top * 1.05)
                .map_err(plot_err)?;
            chart
                .configure_mesh()
                .x_desc("epoch")
                .y_desc("loss")
                .draw()
                .map_err(plot_err)?;

            for (label, values, color) in [
                ("loss", &history.loss, BLUE),
                ("val_loss", &history.val_loss, RED),
            ] {
                chart
                    .draw_series(LineSeries::new(
                        values.iter().enumerate().map(|(e, v)| (e as f64, *v)),
                        &color,
                    ))
                    .map_err(plot_err)?
                    .label(label)
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(plot_err)?;

            root.present().map_err(plot_err)?;
        }
        info!(path = %path.display(), epochs = history.epochs(), "loss curve written");
        Ok(path)
    }
}
