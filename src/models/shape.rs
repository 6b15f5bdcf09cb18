use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use crate::error::ConfigError;

/// Shape of a synthetic ground-truth object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Ellipsoid,
    SpikyCell,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 2] = [ShapeKind::Ellipsoid, ShapeKind::SpikyCell];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Ellipsoid => "ellipsoid",
            ShapeKind::SpikyCell => "spiky_cell",
        }
    }

    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL.iter().map(ShapeKind::as_str).collect()
    }

    /// Draw one set of geometry attributes for this shape
    pub fn sample<R: Rng + ?Sized>(&self, params: &ShapeParams, rng: &mut R) -> ShapeAttributes {
        match self {
            ShapeKind::Ellipsoid => sample_ellipsoid(params, rng),
            ShapeKind::SpikyCell => sample_spiky_cell(params, rng),
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| ConfigError::UnknownShape {
                kind: s.to_string(),
                valid: Self::valid_names(),
            })
    }
}

/// Distribution parameters for the geometry samplers
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeParams {
    /// Mean and standard deviation of the cell size in microns
    pub size_mean_and_std: (f64, f64),
    /// Use one size for all three axes
    pub equal_dimensions: bool,
    /// Uniform range of spike counts relative to surface (spiky cells only)
    pub spikiness_range: (f64, f64),
    /// Uniform range of spike size relative to cell size
    pub spike_size_range: (f64, f64),
    /// Uniform range of spike smoothness
    pub spike_smoothness_range: (f64, f64),
}

impl Default for ShapeParams {
    fn default() -> Self {
        Self {
            size_mean_and_std: (10.0, 2.0),
            equal_dimensions: false,
            spikiness_range: (0.0, 0.0),
            spike_size_range: (0.0, 0.0),
            spike_smoothness_range: (0.05, 0.07),
        }
    }
}

impl ShapeParams {
    /// Build from coerced list values; empty lists fall back to defaults
    pub fn from_lists(
        size_mean_and_std: &[f64],
        equal_dimensions: bool,
        spikiness_range: &[f64],
        spike_size_range: &[f64],
        spike_smoothness_range: &[f64],
    ) -> Self {
        let defaults = Self::default();
        let size_mean_and_std = match size_mean_and_std {
            [] => defaults.size_mean_and_std,
            [mean] => (*mean, 0.0),
            [mean, std, ..] => (*mean, *std),
        };
        Self {
            size_mean_and_std,
            equal_dimensions,
            spikiness_range: range_or(spikiness_range, defaults.spikiness_range),
            spike_size_range: range_or(spike_size_range, defaults.spike_size_range),
            spike_smoothness_range: range_or(
                spike_smoothness_range,
                defaults.spike_smoothness_range,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (mean, std) = self.size_mean_and_std;
        if !(mean.is_finite() && mean > 0.0 && std.is_finite() && std >= 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "size_mean_and_std".to_string(),
                expected: "a positive mean and a nonnegative standard deviation",
                found: format!("({}, {})", mean, std),
            });
        }
        for (key, (low, high)) in [
            ("spikiness_range", self.spikiness_range),
            ("spike_size_range", self.spike_size_range),
            ("spike_smoothness_range", self.spike_smoothness_range),
        ] {
            if !(low.is_finite() && high.is_finite() && low <= high) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    expected: "an ordered pair of finite numbers",
                    found: format!("({}, {})", low, high),
                });
            }
        }
        Ok(())
    }
}

fn range_or(values: &[f64], default: (f64, f64)) -> (f64, f64) {
    match values {
        [] => default,
        [single] => (*single, *single),
        [low, high, ..] => (*low, *high),
    }
}

/// Geometry attributes of one synthetic cell
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeAttributes {
    pub size_x: f64,
    pub size_y: f64,
    pub size_z: f64,
    /// Azimuthal rotation angle, in [0, 2π)
    pub phi: f64,
    /// Polar rotation angle, in [0, π]
    pub theta: f64,
    pub spikes: Option<SpikeAttributes>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeAttributes {
    pub spikiness: f64,
    pub spike_size: f64,
    pub spike_smoothness: f64,
}

fn sample_ellipsoid<R: Rng + ?Sized>(params: &ShapeParams, rng: &mut R) -> ShapeAttributes {
    let (mean, std) = params.size_mean_and_std;
    let (size_x, size_y, size_z) = if params.equal_dimensions {
        let size = positive_normal(mean, std, rng);
        (size, size, size)
    } else {
        (
            positive_normal(mean, std, rng),
            positive_normal(mean, std, rng),
            positive_normal(mean, std, rng),
        )
    };

    ShapeAttributes {
        size_x,
        size_y,
        size_z,
        phi: rng.random_range(0.0..2.0 * PI),
        theta: rng.random_range(0.0..=PI),
        spikes: None,
    }
}

fn sample_spiky_cell<R: Rng + ?Sized>(params: &ShapeParams, rng: &mut R) -> ShapeAttributes {
    let mut attributes = sample_ellipsoid(params, rng);
    attributes.spikes = Some(SpikeAttributes {
        spikiness: uniform_in(params.spikiness_range, rng),
        spike_size: uniform_in(params.spike_size_range, rng),
        spike_smoothness: uniform_in(params.spike_smoothness_range, rng),
    });
    attributes
}

/// Redraw until positive. Callers validate `mean > 0`, so each draw has at
/// least even odds of being accepted.
fn positive_normal<R: Rng + ?Sized>(mean: f64, std: f64, rng: &mut R) -> f64 {
    let normal = match Normal::new(mean, std) {
        Ok(normal) => normal,
        Err(_) => return mean,
    };
    loop {
        let value = normal.sample(rng);
        if value > 0.0 {
            return value;
        }
    }
}

fn uniform_in<R: Rng + ?Sized>((low, high): (f64, f64), rng: &mut R) -> f64 {
    if high > low {
        rng.random_range(low..high)
    } else {
        low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_unknown_shape_is_named() {
        let err = "cube".parse::<ShapeKind>().unwrap_err();
        assert!(err.to_string().contains("cube"));
        assert_eq!("spiky_cell".parse::<ShapeKind>().unwrap(), ShapeKind::SpikyCell);
    }

    #[test]
    fn test_ellipsoid_attributes_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let params = ShapeParams::default();
        for _ in 0..200 {
            let cell = ShapeKind::Ellipsoid.sample(&params, &mut rng);
            assert!(cell.size_x > 0.0 && cell.size_y > 0.0 && cell.size_z > 0.0);
            assert!((0.0..2.0 * PI).contains(&cell.phi));
            assert!((0.0..=PI).contains(&cell.theta));
            assert!(cell.spikes.is_none());
        }
    }

    #[test]
    fn test_equal_dimensions() {
        let mut rng = StdRng::seed_from_u64(1);
        let params = ShapeParams {
            equal_dimensions: true,
            ..Default::default()
        };
        let cell = ShapeKind::Ellipsoid.sample(&params, &mut rng);
        assert_eq!(cell.size_x, cell.size_y);
        assert_eq!(cell.size_y, cell.size_z);
    }

    #[test]
    fn test_spiky_cell_draws_spikes_from_ranges() {
        let mut rng = StdRng::seed_from_u64(3);
        let params = ShapeParams {
            spikiness_range: (0.1, 0.5),
            spike_size_range: (0.2, 0.2),
            ..Default::default()
        };
        let cell = ShapeKind::SpikyCell.sample(&params, &mut rng);
        let spikes = cell.spikes.unwrap();
        assert!((0.1..0.5).contains(&spikes.spikiness));
        assert_eq!(spikes.spike_size, 0.2);
    }

    #[test]
    fn test_params_from_lists_and_validation() {
        let params = ShapeParams::from_lists(&[], false, &[0.3], &[], &[0.1, 0.2]);
        assert_eq!(params.size_mean_and_std, (10.0, 2.0));
        assert_eq!(params.spikiness_range, (0.3, 0.3));
        assert_eq!(params.spike_smoothness_range, (0.1, 0.2));
        assert!(params.validate().is_ok());

        let bad = ShapeParams {
            size_mean_and_std: (0.0, 1.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
