use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::time::Duration;

use super::ScenarioResult;
use super::progression::{ProgressionAggregate, ProgressionRecord};
use labour_game::format_abbreviated;

#[allow(clippy::cast_precision_loss)]
fn success_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (passed as f64 / total as f64) * 100.0
    }
}

pub fn generate_console_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    aggregates: &[ProgressionAggregate],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Logic Test Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "==============================".cyan())?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let failed_tests = total_tests - passed_tests;

    writeln!(out, "Total scenarios: {total_tests}")?;
    writeln!(out, "Passed: {}", passed_tests.to_string().green())?;
    writeln!(out, "Failed: {}", failed_tests.to_string().red())?;
    writeln!(
        out,
        "Success rate: {:.1}%",
        success_rate(passed_tests, total_tests)
    )?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };

        writeln!(
            out,
            "{} {} (seed {})",
            status,
            result.scenario_name.bold(),
            result.seed
        )?;
        writeln!(
            out,
            "   Iterations: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "   Average time: {:?}", result.average_duration)?;

        if !result.failures.is_empty() {
            writeln!(out, "   Failures:")?;
            for failure in &result.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
        writeln!(out)?;
    }

    let fastest = results.iter().min_by_key(|r| r.average_duration);
    let slowest = results.iter().max_by_key(|r| r.average_duration);
    if let (Some(fastest), Some(slowest)) = (fastest, slowest) {
        writeln!(out, "{}", "⚡ Performance Summary".bright_yellow().bold())?;
        writeln!(out, "{}", "=====================".yellow())?;
        writeln!(
            out,
            "Fastest: {} ({:?})",
            fastest.scenario_name.green(),
            fastest.average_duration
        )?;
        writeln!(
            out,
            "Slowest: {} ({:?})",
            slowest.scenario_name.yellow(),
            slowest.average_duration
        )?;
        writeln!(out)?;
    }

    if !aggregates.is_empty() {
        writeln!(out, "{}", "📈 Progression Summary".bright_magenta().bold())?;
        writeln!(out, "{}", "=====================".magenta())?;
        for aggregate in aggregates {
            let fastest = aggregate
                .fastest_completion_seconds
                .map_or_else(|| "-".to_string(), |secs| format!("{secs:.0}s"));
            writeln!(
                out,
                "{:<9} runs {:>3} | complete {:>5.1}% | time {:>8.0}s ± {:<6.0} | fastest {:>7} | clicks {:>7.0} | unlocks {:>4.1} | rejected {:>5.1} | earned {}",
                aggregate.strategy.label(),
                aggregate.iterations,
                aggregate.completion_rate * 100.0,
                aggregate.mean_simulated_seconds,
                aggregate.std_simulated_seconds,
                fastest,
                aggregate.mean_clicks,
                aggregate.mean_unlocks,
                aggregate.mean_rejected_unlocks,
                format_abbreviated(aggregate.mean_lifetime_earned)
            )?;
        }
    }

    Ok(())
}

pub fn generate_json_report(out: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, results)?;
    writeln!(out)?;
    Ok(())
}

pub fn generate_markdown_report(out: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    writeln!(out, "# Planetary Labour Logic Test Results\n")?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let failed_tests = total_tests - passed_tests;

    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total scenarios**: {total_tests}")?;
    writeln!(out, "- **Passed**: {passed_tests}")?;
    writeln!(out, "- **Failed**: {failed_tests}")?;
    writeln!(
        out,
        "- **Success rate**: {:.1}%\n",
        success_rate(passed_tests, total_tests)
    )?;

    writeln!(out, "## Detailed Results\n")?;

    for result in results {
        let status = if result.passed { "✅" } else { "❌" };

        writeln!(
            out,
            "### {} {} (seed {})\n",
            status, result.scenario_name, result.seed
        )?;
        writeln!(
            out,
            "- **Iterations**: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "- **Average time**: {:?}", result.average_duration)?;

        if !result.failures.is_empty() {
            writeln!(out, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(out, "  - {failure}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn generate_csv_report(out: &mut dyn Write, records: &[ProgressionRecord]) -> Result<()> {
    writeln!(
        out,
        "scenario,strategy,seed,steps,completed,clicks,unlocks,rejected_unlocks,simulated_seconds,lifetime_earned"
    )?;
    for record in records {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{:.3},{:.3}",
            record.scenario_name,
            record.strategy.label(),
            record.seed_label,
            record.steps,
            record.completed,
            record.metrics.clicks,
            record.metrics.unlocks,
            record.metrics.rejected_unlocks,
            record.metrics.simulated_seconds,
            record.metrics.lifetime_earned
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::game_tester::ProgressionMetrics;
    use crate::logic::policy::GameplayStrategy;
    use crate::logic::progression::aggregate_progression;

    fn result(name: &str, passed: bool, millis: u64) -> ScenarioResult {
        ScenarioResult {
            scenario_name: name.to_string(),
            seed: 1337,
            passed,
            iterations_run: 2,
            successful_iterations: if passed { 2 } else { 1 },
            failures: if passed {
                Vec::new()
            } else {
                vec!["Iteration 2: balance went negative".to_string()]
            },
            average_duration: Duration::from_millis(millis),
            performance_data: vec![Duration::from_millis(millis)],
        }
    }

    fn record() -> ProgressionRecord {
        ProgressionRecord {
            scenario_name: "Progression Sweep".to_string(),
            strategy: GameplayStrategy::Idler,
            seed_label: "mars".to_string(),
            seed_value: 9,
            steps: 120,
            completed: true,
            metrics: ProgressionMetrics {
                clicks: 40,
                unlocks: 12,
                simulated_seconds: 900.5,
                lifetime_earned: 1_500_000.0,
                ..ProgressionMetrics::default()
            },
        }
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buffer = Vec::new();
        f(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn console_report_lists_failures_and_progression() {
        let aggregates = aggregate_progression(&[record()]);
        let text = render(|out| {
            generate_console_report(
                out,
                &[result("Smoke", true, 5), result("Reset", false, 9)],
                &aggregates,
                Duration::from_secs(1),
            )
        });
        assert!(text.contains("Total scenarios: 2"));
        assert!(text.contains("balance went negative"));
        assert!(text.contains("Progression Summary"));
        assert!(text.contains("Idler"));
    }

    #[test]
    fn console_report_handles_no_results() {
        let text = render(|out| generate_console_report(out, &[], &[], Duration::ZERO));
        assert!(text.contains("Success rate: 0.0%"));
        assert!(!text.contains("Performance Summary"));
    }

    #[test]
    fn markdown_report_has_heading_and_sections() {
        let text = render(|out| generate_markdown_report(out, &[result("Smoke", false, 3)]));
        assert!(text.starts_with("# Planetary Labour Logic Test Results"));
        assert!(text.contains("### ❌ Smoke (seed 1337)"));
        assert!(text.contains("- **Failures**:"));
    }

    #[test]
    fn json_report_is_an_array() {
        let text = render(|out| generate_json_report(out, &[result("Smoke", true, 3)]));
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["scenario_name"], "Smoke");
    }

    #[test]
    fn csv_report_writes_one_row_per_record() {
        let text = render(|out| generate_csv_report(out, &[record()]));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("scenario,strategy,seed"));
        assert_eq!(
            lines[1],
            "Progression Sweep,Idler,mars,120,true,40,12,0,900.500,1500000.000"
        );
    }
}
