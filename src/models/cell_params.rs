use rand::Rng;
use tracing::debug;

use crate::error::ConfigError;
use crate::models::shape::{ShapeAttributes, ShapeKind, ShapeParams, SpikeAttributes};

/// Base geometry columns present in every row
pub const BASE_COLUMNS: [&str; 5] = ["size_x", "size_y", "size_z", "phi", "theta"];
/// Extra columns present for spiky cells
pub const SPIKE_COLUMNS: [&str; 3] = ["spikiness", "spike_size", "spike_smoothness"];
/// Relative position columns, in (z, y, x) order
pub const COORDINATE_COLUMNS: [&str; 3] = ["z", "y", "x"];
pub const KIND_COLUMN: &str = "input_cell_kind";
pub const STACK_COLUMN: &str = "stack";

/// Generated parameters of one synthetic cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellParams {
    pub kind: ShapeKind,
    pub geometry: ShapeAttributes,
    /// Relative position (z, y, x) in [0, 1)³
    pub position: Option<[f64; 3]>,
    /// Index of the stack this cell is rendered into
    pub stack: Option<usize>,
}

/// How many cells each stack holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellCount {
    Fixed(usize),
    /// Uniform integer draw in `[low, high)`, independently per stack
    Range { low: usize, high: usize },
}

impl CellCount {
    /// Interpret a coerced `number_of_cells` value (one or two numbers)
    pub fn from_values(values: &[f64]) -> Result<Self, ConfigError> {
        match values {
            [count] => Ok(CellCount::Fixed(to_count(*count)?)),
            [low, high] => {
                let (low, high) = (to_count(*low)?, to_count(*high)?);
                if low >= high {
                    return Err(ConfigError::InvalidCellCount(format!(
                        "empty range [{}, {})",
                        low, high
                    )));
                }
                Ok(CellCount::Range { low, high })
            }
            other => Err(ConfigError::CellCountArity(other.len())),
        }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        match *self {
            CellCount::Fixed(count) => count,
            CellCount::Range { low, high } => rng.random_range(low..high),
        }
    }
}

fn to_count(value: f64) -> Result<usize, ConfigError> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(ConfigError::InvalidCellCount(value.to_string()))
    }
}

/// Settings for generating a cell-parameter table
#[derive(Debug, Clone)]
pub struct CellGeneration {
    /// Shape name; validated against the shape registry at generation time
    pub kind: String,
    /// `None` for a single ungrouped batch
    pub number_of_stacks: Option<usize>,
    /// One count, or a `[low, high)` pair
    pub number_of_cells: Vec<f64>,
    /// Attach relative positions to every cell
    pub coordinates: bool,
    pub shape: ShapeParams,
}

impl Default for CellGeneration {
    fn default() -> Self {
        Self {
            kind: ShapeKind::Ellipsoid.as_str().to_string(),
            number_of_stacks: None,
            number_of_cells: vec![1.0],
            coordinates: true,
            shape: ShapeParams::default(),
        }
    }
}

/// Ordered table of generated cell parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellParamTable {
    pub rows: Vec<CellParams>,
}

impl CellParamTable {
    pub fn new(rows: Vec<CellParams>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column set: union of attributes over all rows, in a fixed order
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = BASE_COLUMNS.to_vec();
        if self.rows.iter().any(|r| r.geometry.spikes.is_some()) {
            columns.extend(SPIKE_COLUMNS);
        }
        if self.rows.iter().any(|r| r.position.is_some()) {
            columns.extend(COORDINATE_COLUMNS);
        }
        columns.push(KIND_COLUMN);
        if self.rows.iter().any(|r| r.stack.is_some()) {
            columns.push(STACK_COLUMN);
        }
        columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Distinct stack indices in order of first appearance
    pub fn stacks(&self) -> Vec<usize> {
        let mut stacks = Vec::new();
        for stack in self.rows.iter().filter_map(|r| r.stack) {
            if !stacks.contains(&stack) {
                stacks.push(stack);
            }
        }
        stacks
    }

    pub fn rows_in_stack(&self, stack: usize) -> impl Iterator<Item = &CellParams> {
        self.rows.iter().filter(move |r| r.stack == Some(stack))
    }
}

/// Generate a cell-parameter table.
///
/// With `number_of_stacks` unset a single ungrouped batch is produced and
/// `number_of_cells` must be one count. With stacks, a single count applies to
/// every stack and a `[low, high)` pair is drawn independently per stack.
pub fn generate_cell_params<R: Rng + ?Sized>(
    settings: &CellGeneration,
    rng: &mut R,
) -> Result<CellParamTable, ConfigError> {
    let kind: ShapeKind = settings.kind.parse()?;
    settings.shape.validate()?;
    let count = CellCount::from_values(&settings.number_of_cells)?;

    let stack_counts: Vec<(Option<usize>, usize)> = match settings.number_of_stacks {
        None => match count {
            CellCount::Fixed(n) => vec![(None, n)],
            CellCount::Range { .. } => return Err(ConfigError::CellRangeWithoutStacks),
        },
        Some(stacks) => (0..stacks).map(|i| (Some(i), count.draw(rng))).collect(),
    };

    let mut rows = Vec::new();
    for (stack, cells) in stack_counts {
        debug!("Generating {} {} cells for stack {:?}", cells, kind, stack);
        for _ in 0..cells {
            let geometry = kind.sample(&settings.shape, rng);
            let position = settings
                .coordinates
                .then(|| [rng.random(), rng.random(), rng.random()]);
            rows.push(CellParams {
                kind,
                geometry,
                position,
                stack,
            });
        }
    }

    Ok(CellParamTable { rows })
}

impl CellParams {
    /// Value of a numeric column, if the row has it
    pub fn numeric(&self, column: &str) -> Option<f64> {
        let g = &self.geometry;
        let spikes = g.spikes.as_ref();
        match column {
            "size_x" => Some(g.size_x),
            "size_y" => Some(g.size_y),
            "size_z" => Some(g.size_z),
            "phi" => Some(g.phi),
            "theta" => Some(g.theta),
            "spikiness" => spikes.map(|s| s.spikiness),
            "spike_size" => spikes.map(|s| s.spike_size),
            "spike_smoothness" => spikes.map(|s| s.spike_smoothness),
            "z" => self.position.map(|p| p[0]),
            "y" => self.position.map(|p| p[1]),
            "x" => self.position.map(|p| p[2]),
            _ => None,
        }
    }

    pub(crate) fn spikes_from(
        spikiness: Option<f64>,
        spike_size: Option<f64>,
        spike_smoothness: Option<f64>,
    ) -> Option<SpikeAttributes> {
        Some(SpikeAttributes {
            spikiness: spikiness?,
            spike_size: spike_size?,
            spike_smoothness: spike_smoothness?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn settings(stacks: Option<usize>, cells: &[f64]) -> CellGeneration {
        CellGeneration {
            number_of_stacks: stacks,
            number_of_cells: cells.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_batch_has_no_stack_column() {
        let mut rng = StdRng::seed_from_u64(11);
        let table = generate_cell_params(&settings(None, &[5.0]), &mut rng).unwrap();
        assert_eq!(table.len(), 5);
        assert!(!table.has_column(STACK_COLUMN));
        assert!(table.rows.iter().all(|r| r.stack.is_none()));
        assert!(table.has_column("x"));
    }

    #[test]
    fn test_range_per_stack() {
        let mut rng = StdRng::seed_from_u64(5);
        let table = generate_cell_params(&settings(Some(6), &[2.0, 5.0]), &mut rng).unwrap();
        assert_eq!(table.stacks(), vec![0, 1, 2, 3, 4, 5]);
        for stack in table.stacks() {
            let n = table.rows_in_stack(stack).count();
            assert!((2..5).contains(&n), "stack {} has {} cells", stack, n);
        }
    }

    #[test]
    fn test_fixed_count_per_stack() {
        let mut rng = StdRng::seed_from_u64(5);
        let table = generate_cell_params(&settings(Some(3), &[4.0]), &mut rng).unwrap();
        assert_eq!(table.len(), 12);
        assert_eq!(table.rows_in_stack(2).count(), 4);
    }

    #[test]
    fn test_range_without_stacks_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = generate_cell_params(&settings(None, &[2.0, 5.0]), &mut rng).unwrap_err();
        assert!(matches!(err, ConfigError::CellRangeWithoutStacks));
    }

    #[test]
    fn test_bad_arity_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        for cells in [&[][..], &[1.0, 2.0, 3.0][..]] {
            let err = generate_cell_params(&settings(Some(2), cells), &mut rng).unwrap_err();
            assert!(matches!(err, ConfigError::CellCountArity(_)));
        }
    }

    #[test]
    fn test_unknown_shape_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut s = settings(None, &[1.0]);
        s.kind = "cube".to_string();
        let err = generate_cell_params(&s, &mut rng).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownShape { ref kind, .. } if kind == "cube"));
    }

    #[test]
    fn test_spiky_cells_add_spike_columns() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut s = settings(None, &[2.0]);
        s.kind = "spiky_cell".to_string();
        s.coordinates = false;
        let table = generate_cell_params(&s, &mut rng).unwrap();
        let columns = table.columns();
        assert!(columns.contains(&"spikiness"));
        assert!(!columns.contains(&"x"));
        assert_eq!(*columns.last().unwrap(), KIND_COLUMN);
    }
}
