use anyhow::{Result, ensure};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::logic::game_tester::{GameTester, ProgressionMetrics, SimulationPlan};
use crate::logic::policy::GameplayStrategy;
use crate::logic::seeds::SeedInfo;

pub const PROGRESSION_SCENARIO: &str = "Progression Sweep";

/// One simulated run per strategy, seed and iteration.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressionRecord {
    pub scenario_name: String,
    pub strategy: GameplayStrategy,
    pub seed_label: String,
    pub seed_value: u64,
    pub steps: usize,
    pub completed: bool,
    pub metrics: ProgressionMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressionAggregate {
    pub strategy: GameplayStrategy,
    pub iterations: usize,
    pub completion_rate: f64,
    pub mean_simulated_seconds: f64,
    pub std_simulated_seconds: f64,
    pub mean_clicks: f64,
    pub mean_unlocks: f64,
    pub mean_rejected_unlocks: f64,
    pub mean_lifetime_earned: f64,
    pub fastest_completion_seconds: Option<f64>,
}

/// Play every strategy over every seed.
///
/// # Errors
///
/// Returns an error if any run breaks an engine invariant.
pub fn run_progression_analysis(
    tester: &GameTester,
    seeds: &[SeedInfo],
    iterations: usize,
) -> Result<Vec<ProgressionRecord>> {
    let mut records = Vec::new();
    for strategy in GameplayStrategy::ALL {
        let plan = SimulationPlan::new(strategy);
        for seed_info in seeds {
            for iteration in 0..iterations.max(1) {
                let seed = seed_info
                    .seed
                    .wrapping_add(u64::try_from(iteration).unwrap_or(u64::MAX));
                let summary = tester.run_plan(&plan, seed);
                if let Some(reason) = &summary.halted {
                    anyhow::bail!("{strategy} seed {seed} halted: {reason}");
                }
                records.push(ProgressionRecord {
                    scenario_name: PROGRESSION_SCENARIO.to_string(),
                    strategy,
                    seed_label: seed_info.label(),
                    seed_value: seed,
                    steps: summary.steps,
                    completed: summary.completed,
                    metrics: summary.metrics,
                });
            }
        }
    }
    Ok(records)
}

#[must_use]
pub fn aggregate_progression(records: &[ProgressionRecord]) -> Vec<ProgressionAggregate> {
    let mut groups: BTreeMap<&'static str, Vec<&ProgressionRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.strategy.label()).or_default().push(record);
    }

    GameplayStrategy::ALL
        .iter()
        .filter_map(|strategy| {
            let group = groups.get(strategy.label())?;
            Some(aggregate_group(*strategy, group))
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn mean_of(group: &[&ProgressionRecord], value: impl Fn(&ProgressionRecord) -> f64) -> f64 {
    if group.is_empty() {
        return 0.0;
    }
    group.iter().map(|record| value(*record)).sum::<f64>() / group.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn aggregate_group(strategy: GameplayStrategy, group: &[&ProgressionRecord]) -> ProgressionAggregate {
    let mean_seconds = mean_of(group, |r| r.metrics.simulated_seconds);
    let variance = mean_of(group, |r| (r.metrics.simulated_seconds - mean_seconds).powi(2));
    let completion_rate = mean_of(group, |r| if r.completed { 1.0 } else { 0.0 });
    let fastest = group
        .iter()
        .filter(|r| r.completed)
        .map(|r| r.metrics.simulated_seconds)
        .min_by(f64::total_cmp);

    ProgressionAggregate {
        strategy,
        iterations: group.len(),
        completion_rate,
        mean_simulated_seconds: mean_seconds,
        std_simulated_seconds: variance.sqrt(),
        mean_clicks: mean_of(group, |r| r.metrics.clicks as f64),
        mean_unlocks: mean_of(group, |r| r.metrics.unlocks as f64),
        mean_rejected_unlocks: mean_of(group, |r| r.metrics.rejected_unlocks as f64),
        mean_lifetime_earned: mean_of(group, |r| r.metrics.lifetime_earned),
        fastest_completion_seconds: fastest,
    }
}

/// Strategies that should always finish must have finished every run.
///
/// # Errors
///
/// Returns an error naming the first strategy below its target.
pub fn validate_progression_targets(aggregates: &[ProgressionAggregate]) -> Result<()> {
    for aggregate in aggregates {
        if aggregate.strategy.expects_completion() {
            ensure!(
                aggregate.completion_rate >= 1.0,
                "{} completed only {:.1}% of runs",
                aggregate.strategy,
                aggregate.completion_rate * 100.0
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(strategy: GameplayStrategy, completed: bool, seconds: f64) -> ProgressionRecord {
        ProgressionRecord {
            scenario_name: PROGRESSION_SCENARIO.to_string(),
            strategy,
            seed_label: "1".to_string(),
            seed_value: 1,
            steps: 10,
            completed,
            metrics: ProgressionMetrics {
                simulated_seconds: seconds,
                clicks: 4,
                ..ProgressionMetrics::default()
            },
        }
    }

    #[test]
    fn aggregates_by_strategy_in_fixed_order() {
        let records = vec![
            record(GameplayStrategy::Chaotic, false, 10.0),
            record(GameplayStrategy::Greedy, true, 100.0),
            record(GameplayStrategy::Greedy, true, 300.0),
        ];
        let aggregates = aggregate_progression(&records);
        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates[0].strategy, GameplayStrategy::Greedy);
        assert!((aggregates[0].mean_simulated_seconds - 200.0).abs() < 1e-9);
        assert!((aggregates[0].std_simulated_seconds - 100.0).abs() < 1e-9);
        assert_eq!(aggregates[0].fastest_completion_seconds, Some(100.0));
        assert!((aggregates[1].completion_rate).abs() < f64::EPSILON);
        assert!(validate_progression_targets(&aggregates).is_ok());
    }

    #[test]
    fn incomplete_greedy_run_fails_targets() {
        let records = vec![
            record(GameplayStrategy::Greedy, true, 100.0),
            record(GameplayStrategy::Greedy, false, 100.0),
        ];
        let aggregates = aggregate_progression(&records);
        assert!(validate_progression_targets(&aggregates).is_err());
    }

    #[test]
    fn analysis_covers_every_strategy() {
        let tester = GameTester::try_new(false).unwrap();
        let seeds = vec![SeedInfo::from_numeric(11)];
        let records = run_progression_analysis(&tester, &seeds, 1).unwrap();
        assert_eq!(records.len(), GameplayStrategy::ALL.len());
        let aggregates = aggregate_progression(&records);
        validate_progression_targets(&aggregates).unwrap();
    }
}
