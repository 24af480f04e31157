//! Post-build consistency check.
//!
//! Every shape must be found again at its own location: each of its
//! explicit test points (or, if it has none, its representative point)
//! has to lie within exactly one indexed shape, and that shape has to be
//! the one being checked.

use revgeo_index_models::{LatLon, ShapeDefinition};

use crate::source::GeometrySource;
use crate::{IndexError, Searcher};

/// Result of checking a single probe point.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyResult {
    /// Shape that was checked.
    pub shape: String,
    /// Probe coordinate, if one could be determined.
    pub probe: Option<LatLon>,
    /// Whether the probe resolved to the shape.
    pub passed: bool,
    /// Reason for failure (if any).
    pub failure_reason: Option<String>,
}

/// Aggregate report over all checked shapes.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Individual probe results.
    pub results: Vec<VerifyResult>,
    /// Number of probes that passed.
    pub passed: usize,
    /// Total number of probes.
    pub total: usize,
}

impl VerifyReport {
    /// Returns `true` if all probes passed.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// Results of the probes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &VerifyResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    fn record(&mut self, result: VerifyResult) {
        self.total += 1;
        if result.passed {
            self.passed += 1;
        } else {
            log::warn!(
                "FAIL: {} at {:?}: {}",
                result.shape,
                result.probe.map(|p| (p.lat, p.lon)),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
        self.results.push(result);
    }
}

/// Checks that every shape in `shapes` resolves to itself.
///
/// Shapes without an id are not indexed and are ignored.
///
/// # Errors
///
/// Returns an error if a boundary document cannot be read or parsed, or
/// the index cannot be queried. Probe mismatches are reported in the
/// returned [`VerifyReport`], not as errors.
pub fn verify_shapes(
    searcher: &Searcher,
    shapes: &[ShapeDefinition],
    source: &dyn GeometrySource,
) -> Result<VerifyReport, IndexError> {
    let mut report = VerifyReport::default();

    for shape in shapes.iter().filter(|s| !s.id.is_empty()) {
        let probes = if shape.explicit_points.is_empty() {
            let document = source.read_boundary(shape)?;
            let boundary = revgeo_spatial::boundary::parse(&document).map_err(|source| {
                IndexError::Geometry {
                    shape: shape.id.clone(),
                    source,
                }
            })?;
            match boundary.anchor() {
                Some((lat, lon)) => vec![LatLon::new(lat, lon)],
                None => {
                    report.record(VerifyResult {
                        shape: shape.id.clone(),
                        probe: None,
                        passed: false,
                        failure_reason: Some("no representative point".to_string()),
                    });
                    continue;
                }
            }
        } else {
            shape.explicit_points.clone()
        };

        for probe in probes {
            let cities = searcher.containing(probe.lat, probe.lon);
            let failure_reason = match cities.as_slice() {
                [] => Some("no shape contains point".to_string()),
                [city] if *city == shape.id => None,
                [city] => Some(format!("wrong city: {city}")),
                several => Some(format!("{} shapes contain point", several.len())),
            };
            report.record(VerifyResult {
                shape: shape.id.clone(),
                probe: Some(probe),
                passed: failure_reason.is_none(),
                failure_reason,
            });
        }
    }

    log::info!(
        "Verification: {}/{} probes passed",
        report.passed,
        report.total
    );

    Ok(report)
}
