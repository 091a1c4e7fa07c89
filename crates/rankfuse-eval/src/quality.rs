//! Per-query quality metric arrays and their textual serialization.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use rankfuse_core::{format_score, FuseError, FuseResult};

const HEADER_SUMMARY: &str =
    "#Line 1 indicates numQueries. Line 2 contains: NDCG@,AP@,mean P@,mean recall@,mean F-measure@,MAP,N-S";
const HEADER_DETAIL_SUFFIX: &str =
    ". Following lines: precisions,recalls,averagePrecisions,NDCGs,N-Ss";
const MAP_UNAVAILABLE: &str = "not_computed";

/// Quality metrics of one evaluation run: five per-query arrays plus an
/// optional corpus-level mean average precision.
///
/// All five arrays share the same length (the number of queries) and the
/// same index order, which is tied to the fixed query ordering so that
/// repeated runs can be compared query by query.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityQueries {
    pub precisions: Vec<f32>,
    pub recalls: Vec<f32>,
    pub average_precisions: Vec<f32>,
    pub ndcgs: Vec<f32>,
    /// Relevant items among the first four results; NaN when the cutoff was
    /// below four.
    pub ns_scores: Vec<f32>,
    /// Mean average precision over uncut ranks; `None` when it could not be
    /// reliably computed.
    pub map: Option<f32>,
}

impl QualityQueries {
    #[must_use]
    pub fn with_queries(num_queries: usize) -> Self {
        Self {
            precisions: vec![0.0; num_queries],
            recalls: vec![0.0; num_queries],
            average_precisions: vec![0.0; num_queries],
            ndcgs: vec![0.0; num_queries],
            ns_scores: vec![0.0; num_queries],
            map: None,
        }
    }

    #[must_use]
    pub fn num_queries(&self) -> usize {
        self.precisions.len()
    }

    #[must_use]
    pub fn mean_ndcg(&self) -> f32 {
        mean(&self.ndcgs)
    }

    #[must_use]
    pub fn mean_average_precision(&self) -> f32 {
        mean(&self.average_precisions)
    }

    #[must_use]
    pub fn mean_precision(&self) -> f32 {
        mean(&self.precisions)
    }

    #[must_use]
    pub fn mean_recall(&self) -> f32 {
        mean(&self.recalls)
    }

    /// Mean of the per-query F-measures (harmonic mean of precision and
    /// recall, zero when either is zero).
    #[must_use]
    pub fn mean_f_measure(&self) -> f32 {
        let f_measures: Vec<f32> = self
            .precisions
            .iter()
            .zip(&self.recalls)
            .map(|(&p, &r)| harmonic_mean(p, r))
            .collect();
        mean(&f_measures)
    }

    #[must_use]
    pub fn mean_ns_score(&self) -> f32 {
        mean(&self.ns_scores)
    }

    /// Serialize: header comment, query count, 7-field CSV summary, and,
    /// when `include_detail`, one CSV line per metric array.
    pub fn write(&self, out: &mut impl Write, include_detail: bool) -> FuseResult<()> {
        write!(out, "{HEADER_SUMMARY}")?;
        if include_detail {
            write!(out, "{HEADER_DETAIL_SUFFIX}")?;
        }
        writeln!(out)?;
        writeln!(out, "{}", self.num_queries())?;
        write!(
            out,
            "{},{},{},{},{},{},{}",
            format_score(f64::from(self.mean_ndcg())),
            format_score(f64::from(self.mean_average_precision())),
            format_score(f64::from(self.mean_precision())),
            format_score(f64::from(self.mean_recall())),
            format_score(f64::from(self.mean_f_measure())),
            self.map
                .map_or_else(|| MAP_UNAVAILABLE.to_string(), |v| format_score(f64::from(v))),
            format_score(f64::from(self.mean_ns_score())),
        )?;
        if include_detail {
            writeln!(out)?;
            for values in [
                &self.precisions,
                &self.recalls,
                &self.average_precisions,
                &self.ndcgs,
                &self.ns_scores,
            ] {
                let line: Vec<String> = values
                    .iter()
                    .map(|&v| format_score(f64::from(v)))
                    .collect();
                writeln!(out, "{}", line.join(","))?;
            }
        }
        out.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path, include_detail: bool) -> FuseResult<()> {
        let mut out = Vec::new();
        self.write(&mut out, include_detail)?;
        fs::write(path, out)?;
        debug!(
            target: "rankfuse.eval",
            path = %path.display(),
            queries = self.num_queries(),
            "quality metrics saved"
        );
        Ok(())
    }

    /// Parse a file written by [`QualityQueries::save`] with detail included.
    /// Values round-trip up to the serialization's decimal rounding.
    pub fn load(path: &Path) -> FuseResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut lines = text.lines().enumerate();
        let mut next_line = move || -> FuseResult<(usize, &str)> {
            lines
                .next()
                .map(|(index, line)| (index + 1, line))
                .ok_or_else(|| FuseError::CorruptFile {
                    path: path.to_path_buf(),
                    detail: "metrics file truncated".into(),
                })
        };

        let _header = next_line()?;
        let (line_no, raw) = next_line()?;
        let num_queries: usize = raw.trim().parse().map_err(|_| FuseError::MalformedLine {
            path: path.to_path_buf(),
            line: line_no,
            detail: format!("expected query count, got {raw:?}"),
        })?;

        let (line_no, raw) = next_line()?;
        let summary: Vec<&str> = raw.split(',').collect();
        if summary.len() != 7 {
            return Err(FuseError::MalformedLine {
                path: path.to_path_buf(),
                line: line_no,
                detail: format!("expected 7 summary fields, got {}", summary.len()),
            });
        }
        let map = if summary[5] == MAP_UNAVAILABLE {
            None
        } else {
            Some(parse_f32(summary[5], path, line_no)?)
        };

        let mut arrays = Vec::with_capacity(5);
        for _ in 0..5 {
            let (line_no, raw) = next_line()?;
            let values = raw
                .split(',')
                .map(|field| parse_f32(field, path, line_no))
                .collect::<FuseResult<Vec<f32>>>()?;
            if values.len() != num_queries {
                return Err(FuseError::MalformedLine {
                    path: path.to_path_buf(),
                    line: line_no,
                    detail: format!("expected {num_queries} values, got {}", values.len()),
                });
            }
            arrays.push(values);
        }
        let mut arrays = arrays.into_iter();
        Ok(Self {
            precisions: arrays.next().unwrap_or_default(),
            recalls: arrays.next().unwrap_or_default(),
            average_precisions: arrays.next().unwrap_or_default(),
            ndcgs: arrays.next().unwrap_or_default(),
            ns_scores: arrays.next().unwrap_or_default(),
            map,
        })
    }
}

fn parse_f32(field: &str, path: &Path, line: usize) -> FuseResult<f32> {
    field.parse().map_err(|_| FuseError::MalformedLine {
        path: path.to_path_buf(),
        line,
        detail: format!("unparsable metric value {field:?}"),
    })
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

/// `2ab / (a + b)`, zero when the product is zero.
fn harmonic_mean(a: f32, b: f32) -> f32 {
    let numerator = 2.0 * a * b;
    if numerator == 0.0 {
        0.0
    } else {
        numerator / (a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QualityQueries {
        QualityQueries {
            precisions: vec![0.5, 1.0],
            recalls: vec![0.25, 0.5],
            average_precisions: vec![0.75, 1.0],
            ndcgs: vec![0.8, 0.9],
            ns_scores: vec![2.0, 4.0],
            map: Some(0.625),
        }
    }

    #[test]
    fn means_are_arithmetic() {
        let q = sample();
        assert!((q.mean_precision() - 0.75).abs() < 1e-6);
        assert!((q.mean_recall() - 0.375).abs() < 1e-6);
        assert!((q.mean_ndcg() - 0.85).abs() < 1e-6);
        assert!((q.mean_ns_score() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn f_measure_is_mean_of_per_query_harmonics() {
        let q = sample();
        // 2*0.5*0.25/0.75 = 1/3; 2*1*0.5/1.5 = 2/3; mean = 0.5.
        assert!((q.mean_f_measure() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn f_measure_zero_when_either_side_zero() {
        assert_eq!(harmonic_mean(0.0, 0.7), 0.0);
        assert_eq!(harmonic_mean(0.3, 0.0), 0.0);
    }

    #[test]
    fn summary_layout_is_exact() {
        let mut out = Vec::new();
        sample().write(&mut out, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER_SUMMARY);
        assert_eq!(lines[1], "2");
        assert_eq!(lines[2], "0.85,0.875,0.75,0.375,0.5,0.625,3");
    }

    #[test]
    fn map_unavailable_is_literal() {
        let mut q = sample();
        q.map = None;
        let mut out = Vec::new();
        q.write(&mut out, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().nth(2).unwrap().contains(",not_computed,"));
    }

    #[test]
    fn detailed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quality.csv");
        let q = sample();
        q.save(&path, true).unwrap();
        let loaded = QualityQueries::load(&path).unwrap();
        assert_eq!(loaded, q);
    }

    #[test]
    fn not_computed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quality.csv");
        let mut q = sample();
        q.map = None;
        q.save(&path, true).unwrap();
        assert_eq!(QualityQueries::load(&path).unwrap().map, None);
    }

    #[test]
    fn nan_ns_survives_serialization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quality.csv");
        let mut q = sample();
        q.ns_scores = vec![f32::NAN, f32::NAN];
        q.save(&path, true).unwrap();
        let loaded = QualityQueries::load(&path).unwrap();
        assert!(loaded.ns_scores.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn summary_only_file_fails_to_parse_detail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quality.csv");
        sample().save(&path, false).unwrap();
        let err = QualityQueries::load(&path).unwrap_err();
        assert!(matches!(err, FuseError::CorruptFile { .. }));
    }

    #[test]
    fn wrong_summary_field_count_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quality.csv");
        fs::write(&path, "#header\n1\n0.1,0.2,0.3\n").unwrap();
        let err = QualityQueries::load(&path).unwrap_err();
        assert!(matches!(err, FuseError::MalformedLine { line: 3, .. }));
    }
}
