//! ---
//! sim_section: "02-telemetry-documents"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Measurement document model and synthetic value evolution."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::str::FromStr;

use rand::Rng;

use crate::error::{Result, VesError};

const MARKER_START: &str = "[[";
const MARKER_END: &str = "]]";
const RAMP_SEPARATOR: &str = "->";
const RANDOM_SEPARATOR: char = '-';

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeriesKind {
    Random,
    Rising,
    Falling,
}

/// Evolving value bound to one `(group, field)` pair of a template.
///
/// `[[a-b]]` draws uniformly from `[a, b)` on every call. `[[a->b]]` ramps from
/// `a` toward `b` with a doubling step (1, 2, 4, ...) and clamps at `b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSeries {
    kind: SeriesKind,
    start: i64,
    end: i64,
    current: Option<i64>,
    step: i64,
}

impl ValueSeries {
    /// Whether `value` is delimited like a marker. Does not validate the body.
    pub fn is_marker(value: &str) -> bool {
        value.starts_with(MARKER_START) && value.ends_with(MARKER_END) && value.len() >= 4
    }

    pub fn parse(marker: &str) -> Result<Self> {
        let invalid = |reason| VesError::InvalidMarker {
            marker: marker.to_owned(),
            reason,
        };
        if !Self::is_marker(marker) {
            return Err(invalid("missing [[ ]] delimiters"));
        }
        let body = &marker[MARKER_START.len()..marker.len() - MARKER_END.len()];

        if let Some((lhs, rhs)) = body.split_once(RAMP_SEPARATOR) {
            let start = parse_bound(lhs).ok_or_else(|| invalid("ramp bounds must be integers"))?;
            let end = parse_bound(rhs).ok_or_else(|| invalid("ramp bounds must be integers"))?;
            let kind = match start.cmp(&end) {
                std::cmp::Ordering::Less => SeriesKind::Rising,
                std::cmp::Ordering::Greater => SeriesKind::Falling,
                std::cmp::Ordering::Equal => return Err(invalid("ramp bounds must differ")),
            };
            return Ok(Self::new(kind, start, end));
        }

        let (lhs, rhs) = body
            .split_once(RANDOM_SEPARATOR)
            .ok_or_else(|| invalid("expected a-b or a->b"))?;
        let start = parse_bound(lhs).ok_or_else(|| invalid("random bounds must be integers"))?;
        let end = parse_bound(rhs).ok_or_else(|| invalid("random bounds must be integers"))?;
        if start >= end {
            return Err(invalid("random range must be non-empty"));
        }
        Ok(Self::new(SeriesKind::Random, start, end))
    }

    fn new(kind: SeriesKind, start: i64, end: i64) -> Self {
        Self {
            kind,
            start,
            end,
            current: None,
            step: 0,
        }
    }

    pub fn kind(&self) -> SeriesKind {
        self.kind
    }

    pub fn bounds(&self) -> (i64, i64) {
        (self.start, self.end)
    }

    pub fn current(&self) -> Option<i64> {
        self.current
    }

    pub fn next_value(&mut self) -> i64 {
        self.next_value_with(&mut rand::thread_rng())
    }

    /// Advance the series by one tick using the supplied random source.
    pub fn next_value_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> i64 {
        let value = match (self.kind, self.current) {
            (SeriesKind::Random, _) => rng.gen_range(self.start..self.end),
            (_, None) => self.start,
            (SeriesKind::Rising, Some(current)) => {
                self.step = next_step(self.step);
                let candidate = current.saturating_add(self.step);
                if candidate >= self.end {
                    self.step = 0;
                    self.end
                } else {
                    candidate
                }
            }
            (SeriesKind::Falling, Some(current)) => {
                self.step = next_step(self.step);
                current.saturating_sub(self.step).max(self.end)
            }
        };
        self.current = Some(value);
        value
    }
}

impl FromStr for ValueSeries {
    type Err = VesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn next_step(step: i64) -> i64 {
    if step == 0 {
        1
    } else {
        step.saturating_mul(2)
    }
}

fn parse_bound(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn take(series: &mut ValueSeries, count: usize) -> Vec<i64> {
        (0..count).map(|_| series.next_value()).collect()
    }

    #[test]
    fn rising_series_doubles_step_and_saturates() {
        let mut series = ValueSeries::parse("[[10->40]]").unwrap();
        assert_eq!(series.kind(), SeriesKind::Rising);
        assert_eq!(take(&mut series, 8), vec![10, 11, 13, 17, 25, 40, 40, 40]);
    }

    #[test]
    fn falling_series_clamps_at_end() {
        let mut series = ValueSeries::parse("[[40->10]]").unwrap();
        assert_eq!(series.kind(), SeriesKind::Falling);
        assert_eq!(take(&mut series, 7), vec![40, 39, 37, 33, 25, 10, 10]);
    }

    #[test]
    fn random_series_stays_in_half_open_range() {
        let mut series = ValueSeries::parse("[[5-15]]").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let value = series.next_value_with(&mut rng);
            assert!((5..15).contains(&value), "value {} escaped range", value);
        }
    }

    #[test]
    fn rejects_malformed_markers() {
        for marker in [
            "20-50",
            "[[20-50]",
            "[[]]",
            "[[a-b]]",
            "[[-5-10]]",
            "[[10->10]]",
            "[[15-5]]",
            "[[20~50]]",
            "[[2.5-7]]",
        ] {
            assert!(
                matches!(ValueSeries::parse(marker), Err(VesError::InvalidMarker { .. })),
                "{} should be rejected",
                marker
            );
        }
    }

    #[test]
    fn marker_detection_only_checks_delimiters() {
        assert!(ValueSeries::is_marker("[[1-2]]"));
        assert!(ValueSeries::is_marker("[[oops]]"));
        assert!(!ValueSeries::is_marker("42"));
        assert!(!ValueSeries::is_marker("[[]"));
    }
}
