use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::common::scenario::TestScenario;
use crate::logic::game_tester::{GameTester, SimulationPlan, SimulationSummary};
use labour_game::format_abbreviated;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_millis")]
    pub average_duration: Duration,
    #[serde(with = "duration_millis_vec")]
    pub performance_data: Vec<Duration>,
}

pub struct LogicTester {
    tester: GameTester,
}

impl LogicTester {
    pub const fn new(tester: GameTester) -> Self {
        Self { tester }
    }

    pub fn run_scenario(
        &self,
        scenario: &TestScenario,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for &seed in seeds {
            if self.tester.verbose() {
                println!(
                    "🧪 Testing scenario: {} (strategy: {} seed: {})",
                    scenario.name.bright_white(),
                    scenario.plan.strategy,
                    seed
                );
            }

            let result = self.run_single_scenario(scenario, seed, iterations);
            results.push(result);
        }

        results
    }

    fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let (successes, failures, performance_data) =
            self.run_simulation_iterations(&scenario.plan, seed, iterations);

        let avg_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration: avg_duration,
            performance_data,
        }
    }

    fn run_simulation_iterations(
        &self,
        plan: &SimulationPlan,
        seed: u64,
        iterations: usize,
    ) -> (usize, Vec<String>, Vec<Duration>) {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));

            let summary = self.tester.run_plan(plan, iteration_seed);

            if let Some(err) = evaluate_expectations(plan, &summary) {
                let state = &summary.final_state;
                let status = if summary.completed {
                    "complete"
                } else if summary.halted.is_some() {
                    "halted"
                } else {
                    "capped"
                };
                failures.push(format!(
                    "Iteration {} (strategy {}, seed {}, steps {}, status {}): {} | {} | final Labour {} Click {} Passive {}/s Multiplier {:.2}x",
                    i + 1,
                    summary.strategy,
                    summary.seed,
                    summary.steps,
                    status,
                    err,
                    summarize_unlock_path(&summary),
                    format_abbreviated(state.labour_units),
                    state.click_power,
                    state.passive_income_per_second,
                    state.global_multiplier
                ));

                if self.tester.verbose() {
                    println!(
                        "  ❌ Iteration {}/{} failed: {}",
                        i + 1,
                        iterations,
                        err.red()
                    );
                }
            } else {
                successes += 1;
                let duration = start_time.elapsed();
                performance_data.push(duration);

                if self.tester.verbose() {
                    println!(
                        "  ✅ Iteration {}/{} passed ({duration:?}) steps:{} unlocked:{} strategy:{}",
                        i + 1,
                        iterations,
                        summary.steps,
                        summary.final_state.unlocked_count(),
                        summary.strategy
                    );
                }
            }
        }

        (successes, failures, performance_data)
    }
}

fn evaluate_expectations(plan: &SimulationPlan, summary: &SimulationSummary) -> Option<String> {
    if let Some(reason) = &summary.halted {
        return Some(format!("invariant broken: {reason}"));
    }
    for expectation in &plan.expectations {
        if let Err(err) = expectation.evaluate(summary) {
            return Some(format!("{err:#}"));
        }
    }
    None
}

fn summarize_unlock_path(summary: &SimulationSummary) -> String {
    if summary.metrics.unlock_log.is_empty() {
        return "no unlocks recorded".to_string();
    }

    summary
        .metrics
        .unlock_log
        .iter()
        .rev()
        .take(3)
        .map(|entry| {
            format!(
                "step {} ({:.0}s): {} [{}] {}",
                entry.step,
                entry.simulated_seconds,
                entry.node_id,
                entry.policy_name,
                entry.rationale.as_deref().unwrap_or("-")
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod duration_millis_vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Vec::<u64>::deserialize(deserializer)?;
        Ok(millis.into_iter().map(Duration::from_millis).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::policy::GameplayStrategy;

    fn scenario(plan: SimulationPlan) -> TestScenario {
        TestScenario::simulation("Probe", plan)
    }

    #[test]
    fn passing_expectations_count_every_iteration() {
        let tester = LogicTester::new(GameTester::try_new(false).unwrap());
        let plan = SimulationPlan::new(GameplayStrategy::Greedy)
            .with_max_steps(30)
            .with_expectation(|summary: &SimulationSummary| {
                anyhow::ensure!(summary.metrics.clicks > 0, "no clicks");
                Ok(())
            });
        let results = tester.run_scenario(&scenario(plan), &[1, 2], 3);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.passed && r.successful_iterations == 3));
    }

    #[test]
    fn failing_expectation_is_reported_with_context() {
        let tester = LogicTester::new(GameTester::try_new(false).unwrap());
        let plan = SimulationPlan::new(GameplayStrategy::Greedy)
            .with_max_steps(5)
            .with_expectation(|_: &SimulationSummary| anyhow::bail!("deliberate"));
        let results = tester.run_scenario(&scenario(plan), &[7], 2);
        let result = &results[0];
        assert!(!result.passed);
        assert_eq!(result.failures.len(), 2);
        assert!(result.failures[0].contains("deliberate"));
        assert!(result.failures[0].contains("seed 7"));
        assert!(result.failures[1].contains("seed 8"));
    }

    #[test]
    fn result_serializes_durations_as_millis() {
        let result = ScenarioResult {
            scenario_name: "x".to_string(),
            seed: 1,
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_duration: Duration::from_millis(12),
            performance_data: vec![Duration::from_millis(12)],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["average_duration"], 12);
        assert_eq!(json["performance_data"][0], 12);
    }
}
