//! Workload mix selection.
//!
//! A [`WorkloadMix`] decides which generator runs next for a given virtual user and iteration.
//! Every strategy is a pure function of `(vu, iteration)` plus the random source handed in by
//! the caller, so runs with the same seed select the same sequence.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;
use crate::vu::VirtualUser;
use crate::workload::{GeneratorContext, WorkloadGenerator, WorkloadItem};

const WEIGHT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedEntry {
    pub weight: f64,
    pub generator: WorkloadGenerator,
}

/// Contiguous VU id range `first_vu..=last_vu`; `last_vu == None` is open-ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub first_vu: u64,
    pub last_vu: Option<u64>,
    pub generator: WorkloadGenerator,
}

impl Partition {
    fn contains(&self, vu_id: u64) -> bool {
        vu_id >= self.first_vu && self.last_vu.is_none_or(|last| vu_id <= last)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadMix {
    /// One uniform draw `u` in `[0, 1)` picks the first bucket whose cumulative weight exceeds `u`.
    Weighted(Vec<WeightedEntry>),
    /// Assignment by `vu.id`, stable for the whole run.
    Partitioned(Vec<Partition>),
    /// `generators[iteration % len]`.
    IterationCycle(Vec<WorkloadGenerator>),
}

impl WorkloadMix {
    /// Single-generator mix.
    #[must_use]
    pub fn single(generator: WorkloadGenerator) -> Self {
        Self::IterationCycle(vec![generator])
    }

    pub fn weighted<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (f64, WorkloadGenerator)>,
    {
        Self::Weighted(
            entries
                .into_iter()
                .map(|(weight, generator)| WeightedEntry { weight, generator })
                .collect(),
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Weighted(_) => "weighted",
            Self::Partitioned(_) => "partitioned",
            Self::IterationCycle(_) => "iteration_cycle",
        }
    }

    pub fn generators(&self) -> Box<dyn Iterator<Item = &WorkloadGenerator> + '_> {
        match self {
            Self::Weighted(entries) => Box::new(entries.iter().map(|e| &e.generator)),
            Self::Partitioned(parts) => Box::new(parts.iter().map(|p| &p.generator)),
            Self::IterationCycle(gens) => Box::new(gens.iter()),
        }
    }

    pub fn has_chat(&self) -> bool {
        self.generators().any(|g| g.operation.is_chat())
    }

    pub fn validate(&self, ctx: &GeneratorContext) -> Result<(), ConfigError> {
        let empty = match self {
            Self::Weighted(v) => v.is_empty(),
            Self::Partitioned(v) => v.is_empty(),
            Self::IterationCycle(v) => v.is_empty(),
        };
        if empty {
            return Err(ConfigError::EmptyMix {
                mix: self.name().to_string(),
            });
        }

        match self {
            Self::Weighted(entries) => validate_weights(entries)?,
            Self::Partitioned(parts) => validate_partitions(parts)?,
            Self::IterationCycle(_) => {}
        }

        for generator in self.generators() {
            generator.validate(ctx)?;
        }
        Ok(())
    }

    /// Picks the generator for this `(vu, iteration)`. Only `Weighted` consumes randomness.
    pub fn choose<R: Rng + ?Sized>(
        &self,
        vu: &VirtualUser,
        iteration: u64,
        rng: &mut R,
    ) -> Option<&WorkloadGenerator> {
        match self {
            Self::Weighted(entries) => {
                let u: f64 = rng.r#gen();
                let mut cumulative = 0.0;
                for entry in entries {
                    cumulative += entry.weight;
                    if u < cumulative {
                        return Some(&entry.generator);
                    }
                }
                // Rounding can leave the total a hair under 1.0.
                entries
                    .iter()
                    .rev()
                    .find(|e| e.weight > 0.0)
                    .map(|e| &e.generator)
            }
            Self::Partitioned(parts) => parts
                .iter()
                .find(|p| p.contains(vu.id))
                .or_else(|| parts.last())
                .map(|p| &p.generator),
            Self::IterationCycle(gens) => {
                if gens.is_empty() {
                    return None;
                }
                let idx = (iteration % gens.len() as u64) as usize;
                gens.get(idx)
            }
        }
    }
}

fn validate_weights(entries: &[WeightedEntry]) -> Result<(), ConfigError> {
    let mut sum = 0.0;
    for entry in entries {
        if !entry.weight.is_finite() || entry.weight < 0.0 {
            return Err(ConfigError::InvalidWeight {
                generator: entry.generator.name.to_string(),
                weight: entry.weight,
            });
        }
        sum += entry.weight;
    }
    if (sum - 1.0).abs() > WEIGHT_EPSILON {
        return Err(ConfigError::InvalidWeights {
            mix: "weighted".to_string(),
            sum,
        });
    }
    Ok(())
}

fn validate_partitions(parts: &[Partition]) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidPartitions {
        mix: "partitioned".to_string(),
        reason,
    };

    let mut expected_first = 1u64;
    for (i, part) in parts.iter().enumerate() {
        if part.first_vu != expected_first {
            return Err(invalid(format!(
                "partition {i} starts at vu {} but vu {expected_first} is next",
                part.first_vu
            )));
        }
        match part.last_vu {
            Some(last) if last < part.first_vu => {
                return Err(invalid(format!(
                    "partition {i} ends at vu {last} before it starts at vu {}",
                    part.first_vu
                )));
            }
            Some(last) => match last.checked_add(1) {
                Some(next) => expected_first = next,
                // Covers every remaining id, so it behaves like an open-ended partition.
                None if i + 1 == parts.len() => return Ok(()),
                None => {
                    return Err(invalid(format!(
                        "partition {i} ends at the highest vu id but is not the last one"
                    )));
                }
            },
            None if i + 1 != parts.len() => {
                return Err(invalid(format!(
                    "partition {i} is open-ended but is not the last one"
                )));
            }
            None => return Ok(()),
        }
    }
    Err(invalid("the last partition must be open-ended".to_string()))
}

/// The next thing a worker does.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub generator: Arc<str>,
    pub item: WorkloadItem,
    /// Pre-request think time.
    pub delay: Duration,
}

/// A validated mix bound to the run's generator context.
#[derive(Debug, Clone)]
pub struct MixSelector {
    mix: Arc<WorkloadMix>,
    ctx: GeneratorContext,
}

impl MixSelector {
    pub fn new(mix: WorkloadMix, ctx: GeneratorContext) -> Result<Self, ConfigError> {
        mix.validate(&ctx)?;
        Ok(Self {
            mix: Arc::new(mix),
            ctx,
        })
    }

    pub fn mix(&self) -> &WorkloadMix {
        &self.mix
    }

    pub fn next<R: Rng + ?Sized>(
        &self,
        vu: &VirtualUser,
        iteration: u64,
        rng: &mut R,
    ) -> Option<Action> {
        let generator = self.mix.choose(vu, iteration, rng)?;
        let item = generator.generate(&self.ctx, rng)?;
        let delay = generator.delay.sample(rng);
        Some(Action {
            generator: generator.name.clone(),
            item,
            delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ContentKind, FilePick};
    use crate::workload::DelayRange;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn upload(name: &str, file: &str) -> WorkloadGenerator {
        WorkloadGenerator::upload(name, FilePick::Named(file.to_string()), DelayRange::none())
    }

    fn vu(id: u64) -> VirtualUser {
        VirtualUser::new(id, 1)
    }

    #[test]
    fn weighted_frequencies_converge_to_weights() {
        let weights = [0.5, 0.3, 0.2];
        let mix = WorkloadMix::weighted([
            (weights[0], upload("a", "very-small-10KB.txt")),
            (weights[1], upload("b", "small-100KB.txt")),
            (weights[2], upload("c", "medium-1MB.txt")),
        ]);
        mix.validate(&GeneratorContext::default())
            .unwrap_or_else(|e| panic!("{e}"));

        const N: u64 = 100_000;
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<String, u64> = HashMap::new();
        for i in 0..N {
            let g = mix
                .choose(&vu(1), i, &mut rng)
                .unwrap_or_else(|| panic!("no generator"));
            *counts.entry(g.name.to_string()).or_default() += 1;
        }

        for (name, weight) in ["a", "b", "c"].iter().zip(weights) {
            let freq = counts.get(*name).copied().unwrap_or(0) as f64 / N as f64;
            assert!(
                (freq - weight).abs() < 0.02,
                "{name}: freq={freq} weight={weight}"
            );
        }
    }

    #[test]
    fn partitioned_assignment_is_stable_per_vu() {
        let mix = WorkloadMix::Partitioned(vec![
            Partition {
                first_vu: 1,
                last_vu: Some(2),
                generator: upload("heavy", "medium-1MB.txt"),
            },
            Partition {
                first_vu: 3,
                last_vu: Some(7),
                generator: upload("medium", "small-100KB.txt"),
            },
            Partition {
                first_vu: 8,
                last_vu: None,
                generator: upload("light", "very-small-10KB.txt"),
            },
        ]);
        mix.validate(&GeneratorContext::default())
            .unwrap_or_else(|e| panic!("{e}"));

        let mut rng = StdRng::seed_from_u64(1);
        for id in 1..=10u64 {
            let expected = match id {
                1..=2 => "heavy",
                3..=7 => "medium",
                _ => "light",
            };
            for iteration in 0..50 {
                let g = mix
                    .choose(&vu(id), iteration, &mut rng)
                    .unwrap_or_else(|| panic!("no generator for vu {id}"));
                assert_eq!(g.name.as_ref(), expected, "vu {id} iteration {iteration}");
            }
        }
    }

    #[test]
    fn iteration_cycle_alternates() {
        let mix = WorkloadMix::IterationCycle(vec![
            WorkloadGenerator::upload(
                "pdf",
                FilePick::Kinds(vec![ContentKind::Pdf]),
                DelayRange::none(),
            ),
            WorkloadGenerator::upload(
                "office",
                FilePick::Kinds(vec![ContentKind::Word, ContentKind::Slide]),
                DelayRange::none(),
            ),
        ]);
        let mut rng = StdRng::seed_from_u64(3);
        let names: Vec<_> = (0..4)
            .filter_map(|i| mix.choose(&vu(1), i, &mut rng))
            .map(|g| g.name.to_string())
            .collect();
        assert_eq!(names, vec!["pdf", "office", "pdf", "office"]);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mix = WorkloadMix::weighted([
            (0.5, upload("a", "very-small-10KB.txt")),
            (0.4, upload("b", "small-100KB.txt")),
        ]);
        assert!(matches!(
            mix.validate(&GeneratorContext::default()),
            Err(ConfigError::InvalidWeights { .. })
        ));

        let negative = WorkloadMix::weighted([
            (1.5, upload("a", "very-small-10KB.txt")),
            (-0.5, upload("b", "small-100KB.txt")),
        ]);
        let err = match negative.validate(&GeneratorContext::default()) {
            Ok(()) => panic!("expected a negative weight to be rejected"),
            Err(e) => e,
        };
        assert!(matches!(
            &err,
            ConfigError::InvalidWeight { generator, weight } if generator == "b" && *weight == -0.5
        ));
        assert!(!err.to_string().contains("sum"));
    }

    #[test]
    fn partitions_must_be_contiguous_from_one() {
        let gap = WorkloadMix::Partitioned(vec![
            Partition {
                first_vu: 1,
                last_vu: Some(2),
                generator: upload("a", "medium-1MB.txt"),
            },
            Partition {
                first_vu: 4,
                last_vu: None,
                generator: upload("b", "small-100KB.txt"),
            },
        ]);
        assert!(matches!(
            gap.validate(&GeneratorContext::default()),
            Err(ConfigError::InvalidPartitions { .. })
        ));

        let closed = WorkloadMix::Partitioned(vec![Partition {
            first_vu: 1,
            last_vu: Some(5),
            generator: upload("a", "medium-1MB.txt"),
        }]);
        assert!(closed.validate(&GeneratorContext::default()).is_err());
    }

    #[test]
    fn partition_ending_at_the_highest_id_is_accepted_only_last() {
        let ctx = GeneratorContext::default();
        let whole = WorkloadMix::Partitioned(vec![Partition {
            first_vu: 1,
            last_vu: Some(u64::MAX),
            generator: upload("a", "medium-1MB.txt"),
        }]);
        assert!(whole.validate(&ctx).is_ok());

        let trailing = WorkloadMix::Partitioned(vec![
            Partition {
                first_vu: 1,
                last_vu: Some(u64::MAX),
                generator: upload("a", "medium-1MB.txt"),
            },
            Partition {
                first_vu: 1,
                last_vu: None,
                generator: upload("b", "small-100KB.txt"),
            },
        ]);
        assert!(matches!(
            trailing.validate(&ctx),
            Err(ConfigError::InvalidPartitions { .. })
        ));
    }

    #[test]
    fn selector_is_reproducible_for_a_seed() {
        let mix = WorkloadMix::weighted([
            (0.5, upload("a", "very-small-10KB.txt")),
            (0.5, upload("b", "small-100KB.txt")),
        ]);
        let selector = MixSelector::new(mix, GeneratorContext::default())
            .unwrap_or_else(|e| panic!("{e}"));

        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20)
                .filter_map(|i| selector.next(&vu(1), i, &mut rng))
                .map(|a| a.generator.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn empty_mix_is_rejected() {
        assert!(matches!(
            WorkloadMix::IterationCycle(Vec::new()).validate(&GeneratorContext::default()),
            Err(ConfigError::EmptyMix { .. })
        ));
    }
}
