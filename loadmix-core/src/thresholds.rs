use std::fmt;

use crate::error::ConfigError;
use crate::metrics::{MetricValues, MetricsSnapshot};

/// Raw threshold expressions for one metric, as written in a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

impl ThresholdSet {
    pub fn new<I, S>(metric: &str, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metric: metric.to_string(),
            expressions: expressions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

impl Comparator {
    fn token(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
        }
    }

    #[must_use]
    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Lte => observed <= bound,
            Self::Gt => observed > bound,
            Self::Gte => observed >= bound,
            Self::Eq => observed == bound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic {
    /// Counter sum or rate ratio.
    Value,
    Avg,
    Min,
    Med,
    Max,
    Count,
    Rate,
    P(f64),
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => f.write_str("value"),
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Med => f.write_str("med"),
            Self::Max => f.write_str("max"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

impl Statistic {
    /// The observed value, or `None` when the metric kind has no such statistic or no samples.
    #[must_use]
    pub fn observe(&self, values: &MetricValues) -> Option<f64> {
        match (self, values) {
            (Self::Value | Self::Count, MetricValues::Counter { value }) => Some(*value),
            (Self::Value | Self::Rate, MetricValues::Rate { rate, .. }) => *rate,
            (Self::Count, MetricValues::Rate { total, .. }) => Some(*total as f64),
            (Self::Count, MetricValues::Trend(t)) => Some(t.count() as f64),
            (Self::Avg, MetricValues::Trend(t)) => t.avg(),
            (Self::Min, MetricValues::Trend(t)) => t.min(),
            (Self::Med, MetricValues::Trend(t)) => t.median(),
            (Self::Max, MetricValues::Trend(t)) => t.max(),
            (Self::P(p), MetricValues::Trend(t)) => t.percentile(*p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdCondition {
    pub metric: String,
    pub statistic: Statistic,
    pub comparator: Comparator,
    pub bound: f64,
}

impl fmt::Display for ThresholdCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.statistic,
            self.comparator.token(),
            self.bound
        )
    }
}

impl ThresholdCondition {
    pub fn parse(metric: &str, raw: &str) -> Result<Self, ConfigError> {
        let invalid = |error: String| ConfigError::InvalidThreshold {
            metric: metric.to_string(),
            error,
        };

        if metric.trim().is_empty() {
            return Err(invalid("empty metric name".to_string()));
        }

        let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if s.is_empty() {
            return Err(invalid("empty threshold".to_string()));
        }

        let ops = [
            ("<=", Comparator::Lte),
            (">=", Comparator::Gte),
            ("==", Comparator::Eq),
            ("<", Comparator::Lt),
            (">", Comparator::Gt),
        ];
        let (op_pos, op_len, comparator) = ops
            .iter()
            .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
            .ok_or_else(|| invalid(format!("missing operator in `{raw}`")))?;

        let (left, right_with_op) = s.split_at(op_pos);
        let right = &right_with_op[op_len..];
        if left.is_empty() || right.is_empty() {
            return Err(invalid(format!("incomplete threshold `{raw}`")));
        }

        let statistic = parse_statistic(left).ok_or_else(|| {
            invalid(format!("unknown statistic `{left}` in `{raw}`"))
        })?;
        if let Statistic::P(p) = statistic
            && !(p > 0.0 && p <= 100.0)
        {
            return Err(invalid(format!("percentile out of range in `{raw}`")));
        }

        let bound: f64 = right
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| invalid(format!("invalid numeric bound in `{raw}`")))?;

        Ok(Self {
            metric: metric.to_string(),
            statistic,
            comparator,
            bound,
        })
    }
}

fn parse_statistic(left: &str) -> Option<Statistic> {
    let lower = left.to_ascii_lowercase();
    let stat = match lower.as_str() {
        "value" => Statistic::Value,
        "avg" => Statistic::Avg,
        "min" => Statistic::Min,
        "med" => Statistic::Med,
        "max" => Statistic::Max,
        "count" => Statistic::Count,
        "rate" => Statistic::Rate,
        "p90" => Statistic::P(90.0),
        "p95" => Statistic::P(95.0),
        "p99" => Statistic::P(99.0),
        other => {
            let inner = other.strip_prefix("p(")?.strip_suffix(')')?;
            Statistic::P(inner.parse().ok()?)
        }
    };
    Some(stat)
}

/// Parses every expression of every set. The first malformed one aborts.
pub fn parse_thresholds(sets: &[ThresholdSet]) -> Result<Vec<ThresholdCondition>, ConfigError> {
    let mut out = Vec::new();
    for set in sets {
        for expr in &set.expressions {
            out.push(ThresholdCondition::parse(&set.metric, expr)?);
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdViolation {
    pub condition: ThresholdCondition,
    /// `None` when the metric is missing or has no value for the statistic.
    pub observed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Verdict {
    pub passed: bool,
    pub evaluated: usize,
    pub violations: Vec<ThresholdViolation>,
}

/// Checks each condition independently. A missing metric or statistic is a violation.
#[must_use]
pub fn evaluate(conditions: &[ThresholdCondition], snapshot: &MetricsSnapshot) -> Verdict {
    let violations: Vec<ThresholdViolation> = conditions
        .iter()
        .filter_map(|condition| {
            let observed = snapshot
                .get(&condition.metric)
                .and_then(|values| condition.statistic.observe(values));
            let passed =
                observed.is_some_and(|v| condition.comparator.holds(v, condition.bound));
            (!passed).then(|| ThresholdViolation {
                condition: condition.clone(),
                observed,
            })
        })
        .collect();

    Verdict {
        passed: violations.is_empty(),
        evaluated: conditions.len(),
        violations,
    }
}
