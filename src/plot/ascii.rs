//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed points: `o`
//! - fitted curve: `-` line

use crate::report::DayResidual;

/// Render observed points over the fitted curve, with day on the x axis.
pub fn render_fit_plot(residuals: &[DayResidual], width: usize, height: usize) -> String {
    let mut canvas = Canvas::new(residuals, width.max(10), height.max(5));

    // Curve first so points overlay it.
    let mut prev: Option<(usize, usize)> = None;
    for pair in residuals.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let (c0, c1) = (canvas.col(a.day as f64), canvas.col(b.day as f64));
        for c in c0..=c1 {
            let u = if c1 > c0 { (c - c0) as f64 / (c1 - c0) as f64 } else { 0.0 };
            let row = canvas.row(a.fitted + u * (b.fitted - a.fitted));
            canvas.stroke(prev, (c, row));
            prev = Some((c, row));
        }
    }

    for r in residuals {
        let cell = (canvas.col(r.day as f64), canvas.row(r.observed));
        canvas.grid[cell.1][cell.0] = 'o';
    }

    canvas.render()
}

/// Fixed-size character grid with day/value scaling.
struct Canvas {
    grid: Vec<Vec<char>>,
    days: (f64, f64),
    values: (f64, f64),
}

impl Canvas {
    fn new(residuals: &[DayResidual], width: usize, height: usize) -> Self {
        let days = match (residuals.first(), residuals.last()) {
            (Some(a), Some(b)) if b.day > a.day => (a.day as f64, b.day as f64),
            (Some(a), _) => (a.day as f64, a.day as f64 + 1.0),
            _ => (0.0, 1.0),
        };

        let (lo, hi) = residuals
            .iter()
            .flat_map(|r| [r.observed, r.fitted])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let (lo, hi) = if lo.is_finite() && hi.is_finite() && hi > lo { (lo, hi) } else { (0.0, 1.0) };
        // 5% headroom so extremes do not sit on the border.
        let pad = ((hi - lo) * 0.05).max(1e-12);

        Self {
            grid: vec![vec![' '; width]; height],
            days,
            values: (lo - pad, hi + pad),
        }
    }

    fn col(&self, day: f64) -> usize {
        let width = self.grid[0].len();
        scale(day, self.days, width)
    }

    /// Row 0 is the top (largest value).
    fn row(&self, value: f64) -> usize {
        let height = self.grid.len();
        height - 1 - scale(value, self.values, height)
    }

    /// Mark `to`, filling the column gap from `from` so steep segments stay connected.
    fn stroke(&mut self, from: Option<(usize, usize)>, to: (usize, usize)) {
        let (col, row) = to;
        let (top, bottom) = match from {
            Some((c, r)) if c + 1 == col => (r.min(row), r.max(row)),
            _ => (row, row),
        };
        for r in top..=bottom {
            let c = if r == row || from.is_none() { col } else { col - 1 };
            if self.grid[r][c] == ' ' {
                self.grid[r][c] = '-';
            }
        }
    }

    fn render(self) -> String {
        let (d_min, d_max) = self.days;
        let (y_min, y_max) = self.values;
        let mut out = format!("Plot: day=[{d_min:.0}, {d_max:.0}] | y=[{y_min:.2}, {y_max:.2}]\n");
        for row in self.grid {
            out.extend(row);
            out.push('\n');
        }
        out
    }
}

/// Map `v` within `range` onto `0..cells`, clamped to the edges.
fn scale(v: f64, (lo, hi): (f64, f64), cells: usize) -> usize {
    let u = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
    (u * (cells as f64 - 1.0)).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: usize, observed: f64, fitted: f64) -> DayResidual {
        DayResidual {
            day,
            date: None,
            observed,
            fitted,
            residual: observed - fitted,
        }
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let residuals = vec![row(0, 100.0, 100.0), row(1, 110.0, 100.0)];

        let txt = render_fit_plot(&residuals, 10, 5);
        let expected = concat!(
            "Plot: day=[0, 1] | y=[99.50, 110.50]\n",
            "         o\n",
            "          \n",
            "          \n",
            "          \n",
            "o---------\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn steep_segment_stays_connected() {
        let residuals = vec![row(0, 0.0, 0.0), row(1, 0.0, 100.0), row(2, 0.0, 100.0)];

        let txt = render_fit_plot(&residuals, 10, 5);
        let lines: Vec<&str> = txt.lines().skip(1).collect();
        // The rise spans columns 0..=5; every row is marked somewhere in it.
        assert!(lines.iter().all(|l| l[..6].contains('-') || l[..6].contains('o')));
        assert_eq!(lines[0], "     -----");
        assert_eq!(lines[4], "o    o   o");
    }

    #[test]
    fn single_point_does_not_panic() {
        let txt = render_fit_plot(&[row(3, 5.0, 4.0)], 12, 6);
        assert_eq!(txt.lines().count(), 7);
        assert!(txt.contains('o'));
    }
}
