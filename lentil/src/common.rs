pub type Mat = nalgebra::DMatrix<f64>;
pub type DVec = nalgebra::DVector<f64>;

pub use indicatif::{ProgressBar, ProgressStyle};
pub use log::{debug, info, warn};

pub fn new_progress_bar(len: u64, template: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Row-major nested copy of a matrix, for serialization
pub fn mat_rows(m: &Mat) -> Vec<Vec<f64>> {
    m.row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

pub fn ensure_positive(name: &str, x: f64) -> anyhow::Result<()> {
    if !(x.is_finite() && x > 0.0) {
        anyhow::bail!("{} must be positive and finite, got {}", name, x);
    }
    Ok(())
}
