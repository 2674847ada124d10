//! Depth model resolution.
//!
//! A worksheet may describe its sections by lower bound (`depth 1`), upper
//! bound (`depth 2`), mid-point (`depth center`) or any subset of them. The
//! resolver turns whatever is present into three aligned sequences.
//! Missing values are NaN throughout.

use tracing::{debug, warn};

use crate::config::DEFAULT_DEPTH_TOLERANCE;
use crate::error::DepthError;
use crate::grid::Cell;
use crate::schema::depth;

/// One measured section of a core.
#[derive(Debug, Clone, Copy)]
pub struct DepthInterval {
    pub y_low: f64,
    pub y_mid: f64,
    pub y_sup: f64,
}

impl DepthInterval {
    pub fn new(y_low: f64, y_mid: f64, y_sup: f64) -> Self {
        Self { y_low, y_mid, y_sup }
    }

    /// Section spanning `[y_low, y_sup]`, mid-point derived.
    pub fn from_bounds(y_low: f64, y_sup: f64) -> Self {
        Self::new(y_low, (y_low + y_sup) / 2.0, y_sup)
    }

    /// True when no coordinate is known.
    pub fn is_null(&self) -> bool {
        self.y_low.is_nan() && self.y_mid.is_nan() && self.y_sup.is_nan()
    }
}

/// Three equal-length depth sequences.
#[derive(Debug, Clone, Default)]
pub struct DepthModel {
    pub y_low: Vec<f64>,
    pub y_mid: Vec<f64>,
    pub y_sup: Vec<f64>,
}

impl DepthModel {
    pub fn len(&self) -> usize {
        self.y_mid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_mid.is_empty()
    }

    pub fn interval(&self, row: usize) -> DepthInterval {
        DepthInterval::new(self.y_low[row], self.y_mid[row], self.y_sup[row])
    }

    pub fn intervals(&self) -> impl Iterator<Item = DepthInterval> + '_ {
        (0..self.len()).map(|i| self.interval(i))
    }

    /// Gaps between consecutive sections, as empty intervals.
    ///
    /// Only adjacent rows with both facing bounds known are considered.
    pub fn missing_sections(&self, tolerance: f64) -> Vec<DepthInterval> {
        let mut gaps = Vec::new();
        for i in 1..self.len() {
            let top = self.y_sup[i - 1];
            let bottom = self.y_low[i];
            if top.is_finite() && bottom.is_finite() && bottom - top > tolerance {
                gaps.push(DepthInterval::from_bounds(top, bottom));
            }
        }
        gaps
    }
}

/// Raw depth columns, each optional. Absent ≠ present-but-blank.
#[derive(Debug, Clone, Default)]
pub struct DepthColumns {
    pub y_low: Option<Vec<f64>>,
    pub y_mid: Option<Vec<f64>>,
    pub y_sup: Option<Vec<f64>>,
}

impl DepthColumns {
    /// Coerce raw cells to numbers.
    pub fn from_cells(
        y_low: Option<&[Cell]>,
        y_mid: Option<&[Cell]>,
        y_sup: Option<&[Cell]>,
    ) -> Self {
        let coerce = |cells: &[Cell]| cells.iter().map(Cell::to_f64).collect::<Vec<_>>();
        Self {
            y_low: y_low.map(coerce),
            y_mid: y_mid.map(coerce),
            y_sup: y_sup.map(coerce),
        }
    }

    /// Multiply every supplied depth by `factor`, before resolution so that
    /// the core length and tolerance apply in the same unit.
    pub fn scale(&mut self, factor: f64) {
        for column in [&mut self.y_low, &mut self.y_mid, &mut self.y_sup]
            .into_iter()
            .flatten()
        {
            column.iter_mut().for_each(|v| *v *= factor);
        }
    }

    fn present(&self) -> impl Iterator<Item = (&'static str, &Vec<f64>)> {
        [
            (depth::Y_LOW, self.y_low.as_ref()),
            (depth::Y_MID, self.y_mid.as_ref()),
            (depth::Y_SUP, self.y_sup.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, col)| col.map(|c| (name, c)))
    }
}

/// Reconstructs a complete depth triple for every row.
#[derive(Debug, Clone, Copy)]
pub struct DepthResolver {
    tolerance: f64,
    core_length: Option<f64>,
}

impl Default for DepthResolver {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH_TOLERANCE)
    }
}

impl DepthResolver {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            core_length: None,
        }
    }

    /// Known total core length, used to close the last section.
    pub fn with_core_length(mut self, length: Option<f64>) -> Self {
        self.core_length = length.filter(|l| l.is_finite());
        self
    }

    pub fn resolve(&self, columns: DepthColumns) -> Result<DepthModel, DepthError> {
        let rows = Self::check_lengths(&columns)?;
        let rows = Self::trailing_cut(&columns, rows);

        let has_low = columns.y_low.is_some();
        let has_sup = columns.y_sup.is_some();
        let take = |col: Option<Vec<f64>>| match col {
            Some(mut v) => {
                v.truncate(rows);
                v
            }
            None => vec![f64::NAN; rows],
        };
        let mut y_low = take(columns.y_low);
        let y_mid = take(columns.y_mid);
        let mut y_sup = take(columns.y_sup);

        match (has_low, has_sup) {
            (true, false) => self.infer_sup(&y_low, &y_mid, &mut y_sup),
            (false, true) => self.infer_low(&mut y_low, &y_mid, &y_sup),
            (true, true) => Self::complete_rows(&mut y_low, &y_mid, &mut y_sup),
            (false, false) => {}
        }

        let y_mid = self.reconcile_mid(&y_low, y_mid, &y_sup);
        Ok(DepthModel {
            y_low,
            y_mid,
            y_sup,
        })
    }

    fn check_lengths(columns: &DepthColumns) -> Result<usize, DepthError> {
        let mut expected = None;
        for (name, col) in columns.present() {
            match expected {
                None => expected = Some(col.len()),
                Some(n) if n != col.len() => {
                    warn!(column = name, expected = n, found = col.len(), "depth column length mismatch");
                    return Err(DepthError::InconsistentDepth {
                        column: name,
                        expected: n,
                        found: col.len(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(expected.unwrap_or(0))
    }

    /// Rows past the last one with any numeric depth are unused padding.
    fn trailing_cut(columns: &DepthColumns, rows: usize) -> usize {
        let used = (0..rows)
            .rev()
            .find(|&i| columns.present().any(|(_, col)| col[i].is_finite()))
            .map_or(0, |i| i + 1);
        if used < rows {
            debug!(dropped = rows - used, "discarding trailing rows without depth");
        }
        used
    }

    /// Lower bounds only: shift them up one row to get the upper bounds.
    fn infer_sup(&self, y_low: &[f64], y_mid: &[f64], y_sup: &mut [f64]) {
        let n = y_low.len();
        for i in 0..n {
            if y_low[i].is_nan() {
                continue;
            }
            let next = y_low.get(i + 1).copied().filter(|v| v.is_finite());
            y_sup[i] = if i + 1 < n {
                if y_mid[i].is_finite() {
                    2.0 * y_mid[i] - y_low[i]
                } else {
                    next.unwrap_or(f64::NAN)
                }
            } else {
                self.extrapolate_last_sup(y_low, y_mid)
            };
        }
    }

    fn extrapolate_last_sup(&self, y_low: &[f64], y_mid: &[f64]) -> f64 {
        let n = y_low.len();
        let last = y_low[n - 1];
        if let Some(length) = self.core_length.filter(|l| *l > last) {
            return length;
        }
        if y_mid[n - 1].is_finite() {
            return 2.0 * y_mid[n - 1] - last;
        }
        if n >= 2 && y_low[n - 2].is_finite() {
            return last + (last - y_low[n - 2]);
        }
        warn!(y_low = last, "cannot close last section: no core length, mid-point or previous section");
        f64::NAN
    }

    /// Upper bounds only: shift them down one row to get the lower bounds.
    fn infer_low(&self, y_low: &mut [f64], y_mid: &[f64], y_sup: &[f64]) {
        let n = y_sup.len();
        for i in 0..n {
            if y_sup[i].is_nan() {
                continue;
            }
            y_low[i] = if y_mid[i].is_finite() {
                2.0 * y_mid[i] - y_sup[i]
            } else if i > 0 {
                y_sup[i - 1]
            } else if y_sup[0] > 0.0 {
                0.0
            } else if n >= 2 && y_sup[1].is_finite() {
                y_sup[0] - (y_sup[1] - y_sup[0])
            } else {
                warn!(y_sup = y_sup[0], "cannot open first section above the surface datum");
                f64::NAN
            };
        }
    }

    /// Both bounds present: any two known values in a row give the third.
    fn complete_rows(y_low: &mut [f64], y_mid: &[f64], y_sup: &mut [f64]) {
        for i in 0..y_mid.len() {
            let (l, m, s) = (y_low[i], y_mid[i], y_sup[i]);
            if l.is_finite() && s.is_nan() && m.is_finite() {
                y_sup[i] = 2.0 * m - l;
            } else if s.is_finite() && l.is_nan() && m.is_finite() {
                y_low[i] = 2.0 * m - s;
            }
        }
    }

    /// Bounds win over a supplied mid-point.
    fn reconcile_mid(&self, y_low: &[f64], mut y_mid: Vec<f64>, y_sup: &[f64]) -> Vec<f64> {
        for i in 0..y_mid.len() {
            if y_low[i].is_nan() || y_sup[i].is_nan() {
                continue;
            }
            let computed = (y_low[i] + y_sup[i]) / 2.0;
            let supplied = y_mid[i];
            if supplied.is_finite() && (supplied - computed).abs() > self.tolerance {
                warn!(
                    row = i,
                    supplied,
                    computed,
                    "mid-point disagrees with section bounds; recomputed from bounds"
                );
            }
            y_mid[i] = computed;
        }
        y_mid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> DepthResolver {
        DepthResolver::new(1e-9)
    }

    fn close(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len()
            && a
                .iter()
                .zip(b)
                .all(|(x, y)| (x.is_nan() && y.is_nan()) || (x - y).abs() < 1e-9)
    }

    #[test]
    fn bounds_give_mid_point() {
        let model = resolver()
            .resolve(DepthColumns {
                y_low: Some(vec![0.0, 0.1]),
                y_sup: Some(vec![0.1, 0.2]),
                ..Default::default()
            })
            .unwrap();
        assert!(close(&model.y_mid, &[0.05, 0.15]));
    }

    #[test]
    fn bounds_override_disagreeing_mid_point() {
        let model = resolver()
            .resolve(DepthColumns {
                y_low: Some(vec![0.0, 0.1]),
                y_mid: Some(vec![0.05, 0.9]),
                y_sup: Some(vec![0.1, 0.2]),
            })
            .unwrap();
        assert!(close(&model.y_mid, &[0.05, 0.15]));
    }

    #[test]
    fn lower_bounds_only_shift_and_close_with_core_length() {
        let model = resolver()
            .with_core_length(Some(0.35))
            .resolve(DepthColumns {
                y_low: Some(vec![0.0, 0.1, 0.2]),
                ..Default::default()
            })
            .unwrap();
        assert!(close(&model.y_sup, &[0.1, 0.2, 0.35]));
        assert!(close(&model.y_mid, &[0.05, 0.15, 0.275]));
    }

    #[test]
    fn lower_bounds_only_close_with_last_gap() {
        let model = resolver()
            .resolve(DepthColumns {
                y_low: Some(vec![0.0, 0.1, 0.25]),
                ..Default::default()
            })
            .unwrap();
        assert!(close(&model.y_sup, &[0.1, 0.25, 0.4]));
    }

    #[test]
    fn core_length_shorter_than_last_bound_is_ignored() {
        let model = resolver()
            .with_core_length(Some(0.05))
            .resolve(DepthColumns {
                y_low: Some(vec![0.0, 0.1]),
                ..Default::default()
            })
            .unwrap();
        assert!(close(&model.y_sup, &[0.1, 0.2]));
    }

    #[test]
    fn upper_bounds_only_open_at_surface() {
        let model = resolver()
            .resolve(DepthColumns {
                y_sup: Some(vec![0.1, 0.2, 0.3]),
                ..Default::default()
            })
            .unwrap();
        assert!(close(&model.y_low, &[0.0, 0.1, 0.2]));
    }

    #[test]
    fn upper_bound_above_surface_extrapolates_first_gap() {
        let model = resolver()
            .resolve(DepthColumns {
                y_sup: Some(vec![-0.05, 0.05]),
                ..Default::default()
            })
            .unwrap();
        assert!(close(&model.y_low, &[-0.15, -0.05]));
    }

    #[test]
    fn mid_point_only_leaves_bounds_unknown() {
        let model = resolver()
            .resolve(DepthColumns {
                y_mid: Some(vec![0.05, 0.15]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(model.len(), 2);
        assert!(model.y_low.iter().all(|v| v.is_nan()));
        assert!(model.y_sup.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn trailing_padding_is_discarded() {
        let model = resolver()
            .resolve(DepthColumns {
                y_low: Some(vec![0.0, 0.1, f64::NAN, f64::NAN]),
                y_sup: Some(vec![0.1, 0.2, f64::NAN, f64::NAN]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(model.len(), 2);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let err = resolver()
            .resolve(DepthColumns {
                y_low: Some(vec![0.0, 0.1]),
                y_mid: Some(vec![0.05]),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(
            err,
            DepthError::InconsistentDepth {
                column: depth::Y_MID,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn empty_input_is_empty_model() {
        let model = resolver().resolve(DepthColumns::default()).unwrap();
        assert!(model.is_empty());
        let model = resolver()
            .resolve(DepthColumns {
                y_low: Some(vec![f64::NAN]),
                ..Default::default()
            })
            .unwrap();
        assert!(model.is_empty());
    }

    #[test]
    fn gaps_between_sections_are_reported() {
        let model = resolver()
            .resolve(DepthColumns {
                y_low: Some(vec![0.0, 0.2]),
                y_sup: Some(vec![0.1, 0.3]),
                ..Default::default()
            })
            .unwrap();
        let gaps = model.missing_sections(1e-9);
        assert_eq!(gaps.len(), 1);
        assert!((gaps[0].y_low - 0.1).abs() < 1e-12);
        assert!((gaps[0].y_sup - 0.2).abs() < 1e-12);
    }

    #[test]
    fn scale_converts_centimetres() {
        let mut raw = DepthColumns {
            y_low: Some(vec![0.0, 10.0]),
            y_sup: Some(vec![10.0, 20.0]),
            ..Default::default()
        };
        raw.scale(0.01);
        assert!(raw.y_mid.is_none());
        let model = resolver().with_core_length(Some(0.3)).resolve(raw).unwrap();
        assert!(close(&model.y_sup, &[0.1, 0.2]));
        assert!(close(&model.y_mid, &[0.05, 0.15]));
    }
}
