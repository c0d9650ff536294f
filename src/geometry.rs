//! Viewport resolution.
//!
//! Geometry is resolved in two phases around the page load: caller hints
//! are validated up front into a [`GeometryPlan`], and a plan that lacks a
//! width is completed after load by measuring the live document.

use crate::{Error, Result};

/// Viewport height used while capturing in full-page mode. The capture
/// itself determines the final height.
pub const PLACEHOLDER_HEIGHT: u32 = 1;

/// Caller-supplied sizing hints, before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryHints {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Final viewport geometry for one render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedGeometry {
    /// Viewport width in CSS pixels
    pub width: u32,
    /// Fixed viewport height, if the caller supplied one
    pub height: Option<u32>,
    /// Capture the whole scrollable document rather than the viewport
    pub full_page: bool,
}

impl ResolvedGeometry {
    /// Height to apply to the viewport before capture.
    pub fn viewport_height(&self) -> u32 {
        self.height.unwrap_or(PLACEHOLDER_HEIGHT)
    }
}

/// Pre-load half of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryPlan {
    /// The caller supplied a width; nothing needs measuring.
    Fixed(ResolvedGeometry),
    /// Width must be measured from the loaded document.
    MeasureWidth { height: Option<u32>, full_page: bool },
}

impl GeometryPlan {
    /// Validate hints and decide which branch the render will take.
    pub fn from_hints(hints: GeometryHints) -> Result<Self> {
        let width = hints.width.map(|w| positive("width", w)).transpose()?;
        let height = hints.height.map(|h| positive("height", h)).transpose()?;
        let full_page = height.is_none();

        Ok(match width {
            Some(width) => GeometryPlan::Fixed(ResolvedGeometry {
                width,
                height,
                full_page,
            }),
            None => GeometryPlan::MeasureWidth { height, full_page },
        })
    }

    pub fn needs_measurement(&self) -> bool {
        matches!(self, GeometryPlan::MeasureWidth { .. })
    }

    /// Complete the plan. `measure_width` is only called when the caller
    /// did not supply a width.
    pub fn resolve<F>(self, measure_width: F) -> Result<ResolvedGeometry>
    where
        F: FnOnce() -> Result<u32>,
    {
        match self {
            GeometryPlan::Fixed(geometry) => Ok(geometry),
            GeometryPlan::MeasureWidth { height, full_page } => {
                // An empty body measures 0; keep the viewport valid.
                let width = measure_width()?.max(1);
                Ok(ResolvedGeometry {
                    width,
                    height,
                    full_page,
                })
            }
        }
    }
}

fn positive(name: &'static str, value: u32) -> Result<u32> {
    if value == 0 {
        return Err(Error::InvalidParameter {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Parse a raw width/height parameter.
///
/// Absent or blank values mean "not supplied". Anything else must be a
/// positive decimal integer.
pub fn parse_dimension(name: &'static str, raw: Option<&str>) -> Result<Option<u32>> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    let invalid = || Error::InvalidParameter {
        name,
        value: raw.to_string(),
    };
    let value: i64 = raw.parse().map_err(|_| invalid())?;
    if value <= 0 {
        return Err(invalid());
    }
    u32::try_from(value).map(Some).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(width: Option<u32>, height: Option<u32>) -> GeometryHints {
        GeometryHints { width, height }
    }

    #[test]
    fn supplied_width_without_height_is_full_page() {
        let plan = GeometryPlan::from_hints(hints(Some(400), None)).unwrap();
        assert!(!plan.needs_measurement());
        let g = plan.resolve(|| panic!("width must not be measured")).unwrap();
        assert_eq!(g.width, 400);
        assert!(g.full_page);
        assert_eq!(g.viewport_height(), PLACEHOLDER_HEIGHT);
    }

    #[test]
    fn supplied_height_disables_full_page() {
        for width in [Some(1024), None] {
            let plan = GeometryPlan::from_hints(hints(width, Some(600))).unwrap();
            let g = plan.resolve(|| Ok(777)).unwrap();
            assert!(!g.full_page);
            assert_eq!(g.height, Some(600));
            assert_eq!(g.viewport_height(), 600);
        }
    }

    #[test]
    fn missing_width_is_measured_after_load() {
        let plan = GeometryPlan::from_hints(hints(None, None)).unwrap();
        assert!(plan.needs_measurement());
        let g = plan.resolve(|| Ok(912)).unwrap();
        assert_eq!(g.width, 912);
        assert!(g.full_page);
    }

    #[test]
    fn measured_zero_width_is_clamped() {
        let plan = GeometryPlan::from_hints(hints(None, Some(10))).unwrap();
        assert_eq!(plan.resolve(|| Ok(0)).unwrap().width, 1);
    }

    #[test]
    fn measurement_errors_propagate() {
        let plan = GeometryPlan::from_hints(hints(None, None)).unwrap();
        let err = plan
            .resolve(|| Err(Error::CaptureFailure("eval failed".into())))
            .unwrap_err();
        assert!(matches!(err, Error::CaptureFailure(_)));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let err = GeometryPlan::from_hints(hints(Some(0), None)).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "width", .. }));
        let err = GeometryPlan::from_hints(hints(Some(10), Some(0))).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "height", .. }));
    }

    #[test]
    fn parse_dimension_accepts_positive_integers() {
        assert_eq!(parse_dimension("width", Some("400")).unwrap(), Some(400));
        assert_eq!(parse_dimension("width", Some(" 80 ")).unwrap(), Some(80));
        assert_eq!(parse_dimension("width", None).unwrap(), None);
        assert_eq!(parse_dimension("width", Some("")).unwrap(), None);
    }

    #[test]
    fn parse_dimension_rejects_bad_values() {
        for raw in ["0", "-5", "abc", "12.5", "99999999999"] {
            let err = parse_dimension("height", Some(raw)).unwrap_err();
            match err {
                Error::InvalidParameter { name, value } => {
                    assert_eq!(name, "height");
                    assert_eq!(value, raw);
                }
                other => panic!("unexpected error for {:?}: {}", raw, other),
            }
        }
    }
}
