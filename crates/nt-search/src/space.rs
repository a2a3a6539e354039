//! Generic search space: an ordered list of parameter specs, sampled in
//! declaration order so later specs may read values already in the
//! assignment.

use nt_types::{Assignment, ParameterValue, SamplingError};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    /// Continuous range [low, high]; log-uniform when `log_scale` is set.
    Float { low: f64, high: f64, log_scale: bool },
    /// Integer range [low, high] inclusive.
    Int { low: i64, high: i64 },
}

/// Dependency rule narrowing a domain from an already-sampled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClipRule {
    /// The effective upper bound of an `Int` domain becomes
    /// `min(high, value_of(param))`. With a lower bound of 0 this makes
    /// every sampled index valid by construction.
    UpperToValueOf { param: String },
}

/// Conditional presence of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActiveIf {
    /// Sample this spec only while `param`'s value is strictly greater
    /// than `value`.
    GreaterThan { param: String, value: i64 },
}

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub domain: Domain,
    pub clip: Option<ClipRule>,
    pub active_if: Option<ActiveIf>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            name: name.into(),
            domain,
            clip: None,
            active_if: None,
        }
    }

    pub fn clipped_by(mut self, param: impl Into<String>) -> Self {
        self.clip = Some(ClipRule::UpperToValueOf {
            param: param.into(),
        });
        self
    }

    pub fn active_if_greater_than(mut self, param: impl Into<String>, value: i64) -> Self {
        self.active_if = Some(ActiveIf::GreaterThan {
            param: param.into(),
            value,
        });
        self
    }
}

/// The full search space: an ordered list of parameter specs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub specs: Vec<ParameterSpec>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.specs.push(ParameterSpec::new(
            name,
            Domain::Float {
                low,
                high,
                log_scale: false,
            },
        ));
        self
    }

    pub fn add_log_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.specs.push(ParameterSpec::new(
            name,
            Domain::Float {
                low,
                high,
                log_scale: true,
            },
        ));
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.specs
            .push(ParameterSpec::new(name, Domain::Int { low, high }));
        self
    }

    pub fn push(mut self, spec: ParameterSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Parameter names in sampling order. Conditionally-active specs are
    /// included; whether they appear in a given assignment depends on the
    /// sampled values.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    /// Sample one assignment. Specs are visited in order; clip and
    /// activation rules read values sampled earlier in the same pass.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<Assignment, SamplingError> {
        let mut assignment = Assignment::new();

        for spec in &self.specs {
            if let Some(ActiveIf::GreaterThan { param, value }) = &spec.active_if {
                let gate = int_dependency(&assignment, &spec.name, param)?;
                if gate <= *value {
                    continue;
                }
            }

            let value = match &spec.domain {
                Domain::Float {
                    low,
                    high,
                    log_scale,
                } => {
                    let v = if *log_scale {
                        rng.gen_range(low.ln()..=high.ln()).exp()
                    } else {
                        rng.gen_range(*low..=*high)
                    };
                    ParameterValue::Float(v)
                }
                Domain::Int { low, high } => {
                    let mut high = *high;
                    if let Some(ClipRule::UpperToValueOf { param }) = &spec.clip {
                        high = high.min(int_dependency(&assignment, &spec.name, param)?);
                    }
                    if *low > high {
                        return Err(SamplingError::EmptyRange {
                            param: spec.name.clone(),
                            low: *low,
                            high,
                        });
                    }
                    ParameterValue::Int(rng.gen_range(*low..=high))
                }
            };

            assignment.insert(&spec.name, value);
        }

        Ok(assignment)
    }
}

fn int_dependency(
    assignment: &Assignment,
    param: &str,
    depends_on: &str,
) -> Result<i64, SamplingError> {
    let value = assignment
        .get(depends_on)
        .ok_or_else(|| SamplingError::UnsatisfiedDependency {
            param: param.to_string(),
            depends_on: depends_on.to_string(),
        })?;
    value
        .as_int()
        .ok_or_else(|| SamplingError::NonIntegerDependency {
            param: param.to_string(),
            depends_on: depends_on.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    #[test]
    fn sampling_respects_bounds() {
        let space = SearchSpace::new()
            .add_int("decay_steps", 1, 10)
            .add_float("dropout", 0.0, 0.5);

        for seed in 0..50 {
            let a = space.sample(&mut rng(seed)).unwrap();
            let steps = a.get_int("decay_steps").unwrap();
            assert!((1..=10).contains(&steps));
            let dropout = a.get_f64("dropout").unwrap();
            assert!((0.0..=0.5).contains(&dropout));
        }
    }

    #[test]
    fn log_uniform_stays_in_bounds() {
        let space = SearchSpace::new().add_log_float("learning_rate", 1e-4, 1e-1);
        for seed in 0..100 {
            let a = space.sample(&mut rng(seed)).unwrap();
            let lr = a.get_f64("learning_rate").unwrap();
            assert!((1e-4..=1e-1).contains(&lr), "lr out of bounds: {lr}");
        }
    }

    #[test]
    fn clip_narrows_the_upper_bound() {
        let space = SearchSpace::new()
            .add_int("first", 0, 8)
            .push(ParameterSpec::new("second", Domain::Int { low: 0, high: 8 }).clipped_by("first"));

        for seed in 0..100 {
            let a = space.sample(&mut rng(seed)).unwrap();
            let first = a.get_int("first").unwrap();
            let second = a.get_int("second").unwrap();
            assert!(second <= first, "second {second} exceeds first {first}");
        }
    }

    #[test]
    fn inactive_specs_are_skipped() {
        let space = SearchSpace::new().add_int("n", 2, 2).push(
            ParameterSpec::new("extra", Domain::Int { low: 0, high: 5 })
                .active_if_greater_than("n", 2),
        );

        let a = space.sample(&mut rng(0)).unwrap();
        assert!(a.contains("n"));
        assert!(!a.contains("extra"));
    }

    #[test]
    fn unknown_dependency_is_an_error() {
        let space = SearchSpace::new()
            .push(ParameterSpec::new("x", Domain::Int { low: 0, high: 5 }).clipped_by("missing"));

        match space.sample(&mut rng(0)) {
            Err(SamplingError::UnsatisfiedDependency { param, depends_on }) => {
                assert_eq!(param, "x");
                assert_eq!(depends_on, "missing");
            }
            other => panic!("expected dependency error, got {other:?}"),
        }
    }

    #[test]
    fn float_dependency_is_rejected() {
        let space = SearchSpace::new()
            .add_float("f", 0.0, 1.0)
            .push(ParameterSpec::new("x", Domain::Int { low: 0, high: 5 }).clipped_by("f"));

        assert!(matches!(
            space.sample(&mut rng(0)),
            Err(SamplingError::NonIntegerDependency { .. })
        ));
    }

    #[test]
    fn spec_round_trips_through_json() {
        let space = SearchSpace::new().add_log_float("lr", 1e-4, 1e-1).push(
            ParameterSpec::new("h1", Domain::Int { low: 0, high: 8 })
                .clipped_by("h0")
                .active_if_greater_than("n", 1),
        );
        let json = serde_json::to_string(&space).unwrap();
        let back: SearchSpace = serde_json::from_str(&json).unwrap();
        assert_eq!(space, back);
    }
}
