use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use loadmix_core::{
    ChatShape, ContentKind, DelayRange, FilePick, Partition, RampStage, ScenarioDefinition,
    SchedulePolicy, ThresholdSet, WeightedEntry, WorkloadGenerator, WorkloadMix,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioYaml {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: String,

    // fixed policy
    #[serde(default)]
    pub vus: Option<u64>,
    #[serde(default)]
    pub duration: Option<YamlDuration>,

    // staged policy
    #[serde(default)]
    pub stages: Vec<StageYaml>,

    pub mix: MixYaml,

    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdExprYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StageYaml {
    pub target: u64,
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum MixYaml {
    Weighted(Vec<WeightedYaml>),
    Partitioned(Vec<PartitionYaml>),
    Cycle(Vec<GeneratorYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WeightedYaml {
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub generator: GeneratorYaml,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PartitionYaml {
    pub first_vu: u64,
    #[serde(default)]
    pub last_vu: Option<u64>,
    pub generator: GeneratorYaml,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub(crate) enum GeneratorYaml {
    /// `file` names one catalog entry; otherwise `kinds` (or any file when both are absent).
    Upload {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        kinds: Vec<ContentKind>,
        #[serde(default)]
        delay: DelayYaml,
    },
    Chat {
        #[serde(default)]
        name: Option<String>,
        shape: ChatShape,
        #[serde(default)]
        delay: DelayYaml,
    },
    Browse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        delay: DelayYaml,
    },
}

/// Think time in milliseconds, inclusive on both ends.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DelayYaml {
    #[serde(default)]
    pub min_ms: u64,
    #[serde(default)]
    pub max_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v < 0 {
                    return Err(E::custom("duration cannot be negative"));
                }
                Ok(YamlDuration(Duration::from_secs(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(E::custom)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioDocYamlMulti {
    scenarios: Vec<ScenarioYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScenarioDocYaml {
    Multi(ScenarioDocYamlMulti),
    Flat(Box<ScenarioYaml>),
}

/// Reads a scenario file: either a single scenario document or `scenarios: [...]`.
///
/// Structural checks (policy, mix, thresholds) are left to the run itself, so that a
/// malformed scenario surfaces the same configuration errors as a built-in one.
pub async fn load_scenarios(path: &Path) -> anyhow::Result<Vec<ScenarioDefinition>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario YAML: {}", path.display()))?;
    parse_scenarios(&bytes, path)
}

fn parse_scenarios(bytes: &[u8], path: &Path) -> anyhow::Result<Vec<ScenarioDefinition>> {
    let doc: ScenarioDocYaml = serde_yaml::from_slice(bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    let scenarios = match doc {
        ScenarioDocYaml::Multi(d) => d.scenarios,
        ScenarioDocYaml::Flat(d) => vec![*d],
    };
    anyhow::ensure!(
        !scenarios.is_empty(),
        "no scenarios defined in {}",
        path.display()
    );

    let total = scenarios.len();
    scenarios
        .into_iter()
        .enumerate()
        .map(|(idx, scenario)| {
            let default_name = if total <= 1 {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "main".to_string())
            } else {
                format!("scenario_{}", idx + 1)
            };
            scenario_yaml_into_definition(scenario, default_name)
        })
        .collect()
}

fn scenario_yaml_into_definition(
    scenario: ScenarioYaml,
    default_name: String,
) -> anyhow::Result<ScenarioDefinition> {
    let ScenarioYaml {
        name,
        description,
        vus,
        duration,
        stages,
        mix,
        thresholds,
    } = scenario;
    let name = name.unwrap_or(default_name);

    let policy = match (vus, duration, stages.is_empty()) {
        (_, _, false) => {
            anyhow::ensure!(
                vus.is_none() && duration.is_none(),
                "scenario `{name}`: use either `vus`/`duration` or `stages`, not both"
            );
            SchedulePolicy::Staged {
                stages: stages
                    .into_iter()
                    .map(|s| RampStage::new(s.duration.into_inner(), s.target))
                    .collect(),
            }
        }
        (Some(vus), Some(duration), true) => SchedulePolicy::Fixed {
            vus,
            duration: duration.into_inner(),
        },
        _ => anyhow::bail!("scenario `{name}`: needs `vus` and `duration`, or `stages`"),
    };

    let mix = match mix {
        MixYaml::Weighted(entries) => WorkloadMix::Weighted(
            entries
                .into_iter()
                .enumerate()
                .map(|(i, e)| WeightedEntry {
                    weight: e.weight,
                    generator: e.generator.into_generator(i),
                })
                .collect(),
        ),
        MixYaml::Partitioned(parts) => WorkloadMix::Partitioned(
            parts
                .into_iter()
                .enumerate()
                .map(|(i, p)| Partition {
                    first_vu: p.first_vu,
                    last_vu: p.last_vu,
                    generator: p.generator.into_generator(i),
                })
                .collect(),
        ),
        MixYaml::Cycle(generators) => WorkloadMix::IterationCycle(
            generators
                .into_iter()
                .enumerate()
                .map(|(i, g)| g.into_generator(i))
                .collect(),
        ),
    };

    let thresholds = thresholds
        .into_iter()
        .map(|(metric, expr)| match expr {
            ThresholdExprYaml::One(s) => ThresholdSet::new(&metric, [s]),
            ThresholdExprYaml::Many(v) => ThresholdSet::new(&metric, v),
        })
        .collect();

    Ok(ScenarioDefinition {
        name,
        description,
        policy,
        mix,
        thresholds,
    })
}

impl DelayYaml {
    fn into_range(self) -> DelayRange {
        DelayRange::new(self.min_ms, self.max_ms)
    }
}

impl GeneratorYaml {
    fn into_generator(self, idx: usize) -> WorkloadGenerator {
        match self {
            Self::Upload {
                name,
                file,
                kinds,
                delay,
            } => {
                let pick = match (file, kinds.is_empty()) {
                    (Some(file), _) => FilePick::Named(file),
                    (None, false) => FilePick::Kinds(kinds),
                    (None, true) => FilePick::Any,
                };
                let name = name.unwrap_or_else(|| format!("upload_{}", idx + 1));
                WorkloadGenerator::upload(&name, pick, delay.into_range())
            }
            Self::Chat { name, shape, delay } => {
                let name = name.unwrap_or_else(|| shape.to_string());
                WorkloadGenerator::chat(&name, shape, delay.into_range())
            }
            Self::Browse { name, delay } => {
                let name = name.unwrap_or_else(|| "browse".to_string());
                WorkloadGenerator::browse(&name, delay.into_range())
            }
        }
    }
}
