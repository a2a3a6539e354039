//! The concrete tuning space for the layered network trainer.
//!
//! Primitives follow the trainer's tunable surface: optimizer settings,
//! scheduler settings, and a chain of hidden-layer width indexes where each
//! layer's index is clipped to the previous one, so widths never grow with
//! depth. Derived values (batch size, samples per epoch, actual widths) are
//! computed here and carried in the assignment for materialization and
//! logging.

use nt_types::{Assignment, ParameterValue, SamplingError};
use rand::Rng;
use tracing::debug;

use crate::space::{Domain, ParameterSpec, SearchSpace};

/// Epoch count is fixed per study, not sampled.
pub const DEFAULT_EPOCHS: i64 = 100;

/// Batch sizes are multiples of this unit.
const BATCH_UNIT: i64 = 16;

const MAX_HIDDEN_LAYERS: i64 = 5;

/// Search space plus the candidate width ladder and fixed training length.
#[derive(Debug, Clone)]
pub struct NetworkSpace {
    space: SearchSpace,
    widths: Vec<i64>,
    epochs: i64,
}

impl NetworkSpace {
    /// Candidate widths are powers of two strictly greater than
    /// `output_dim`, up to `2^max_exponent`, computed once.
    pub fn new(output_dim: i64, max_exponent: u32, epochs: i64) -> Self {
        let mut exp = 0u32;
        while (1i64 << exp) <= output_dim {
            exp += 1;
        }
        let widths: Vec<i64> = (exp..=max_exponent).map(|e| 1i64 << e).collect();
        debug!(?widths, "candidate hidden-layer widths");

        let idx_high = widths.len() as i64 - 1;
        let mut space = SearchSpace::new()
            .add_log_float("learning_rate", 1e-4, 1e-1)
            .add_int("batch_size_multiplier", 2, 16)
            .add_float("dropout", 0.0, 0.5)
            .add_float("decay_rate", 0.8, 0.99)
            .add_int("decay_steps", 1, 10)
            .add_log_float("min_lr", 1e-5, 1e-3)
            .add_int("samples_per_epoch_multiplier", 8, 32)
            .add_int("n_hidden_layers", 2, MAX_HIDDEN_LAYERS)
            .add_int("hidden_size_0", 0, idx_high);

        for i in 1..MAX_HIDDEN_LAYERS {
            space = space.push(
                ParameterSpec::new(
                    format!("hidden_size_{i}"),
                    Domain::Int {
                        low: 0,
                        high: idx_high,
                    },
                )
                .clipped_by(format!("hidden_size_{}", i - 1))
                .active_if_greater_than("n_hidden_layers", i),
            );
        }

        Self {
            space,
            widths,
            epochs,
        }
    }

    /// The space for the shipped trainer: 6 output classes, widths up to
    /// 2048, 100 epochs.
    pub fn standard() -> Self {
        Self::new(6, 11, DEFAULT_EPOCHS)
    }

    pub fn widths(&self) -> &[i64] {
        &self.widths
    }

    pub fn epochs(&self) -> i64 {
        self.epochs
    }

    /// Names of the sampled primitives, in sampling order.
    pub fn sampled_names(&self) -> Vec<String> {
        self.space.names().map(str::to_string).collect()
    }

    /// Sample primitives, then attach derived values.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<Assignment, SamplingError> {
        let assignment = self.space.sample(rng)?;
        self.expand(assignment)
    }

    /// Deterministically derive batch size, samples per epoch, epoch count,
    /// and actual hidden widths from the sampled primitives.
    pub fn expand(&self, mut assignment: Assignment) -> Result<Assignment, SamplingError> {
        let batch_multiplier = sampled_int(&assignment, "batch_size_multiplier")?;
        let batch_size = batch_multiplier * BATCH_UNIT;
        assignment.insert("batch_size", ParameterValue::Int(batch_size));

        let samples_multiplier = sampled_int(&assignment, "samples_per_epoch_multiplier")?;
        assignment.insert(
            "samples_per_epoch",
            ParameterValue::Int(samples_multiplier * batch_size),
        );

        assignment.insert("epochs", ParameterValue::Int(self.epochs));

        let n_layers = sampled_int(&assignment, "n_hidden_layers")?;
        for i in 0..n_layers {
            let idx = sampled_int(&assignment, &format!("hidden_size_{i}"))?;
            assignment.insert(
                format!("hidden_width_{i}"),
                ParameterValue::Int(self.widths[idx as usize]),
            );
        }

        Ok(assignment)
    }

    /// The derived layer widths of an expanded assignment, outermost first.
    pub fn hidden_widths(&self, assignment: &Assignment) -> Vec<i64> {
        let n_layers = assignment.get_int("n_hidden_layers").unwrap_or(0);
        (0..n_layers)
            .filter_map(|i| assignment.get_int(&format!("hidden_width_{i}")))
            .collect()
    }
}

fn sampled_int(assignment: &Assignment, name: &str) -> Result<i64, SamplingError> {
    assignment
        .get_int(name)
        .ok_or_else(|| SamplingError::UnsatisfiedDependency {
            param: name.to_string(),
            depends_on: name.to_string(),
        })
}
