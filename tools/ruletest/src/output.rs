//! Console output

use colored::*;
use voltage_ruletest::{RuleAnalysis, RunSummary, ScenarioResult, TestScenario};

pub fn print_analysis(analysis: &RuleAnalysis) {
    println!("{}", "Rule Analysis".bright_cyan().bold());
    println!("  Rules: {}", analysis.rules.len());

    println!();
    println!("{} ({})", "Input sensors".bright_cyan(), analysis.input_sensors.len());
    for sensor in &analysis.input_sensors {
        println!("  {}", sensor);
    }

    println!();
    println!("{}", "Sensors by rule".bright_cyan());
    for (rule, sensors) in &analysis.sensors_by_rule {
        let list: Vec<&str> = sensors.iter().map(String::as_str).collect();
        println!("  {}: {}", rule.bold(), list.join(", "));
    }

    println!();
    println!("{} ({})", "Dependencies".bright_cyan(), analysis.dependencies.len());
    for dependency in &analysis.dependencies {
        println!(
            "  {} -> {} via {} ({:?})",
            dependency.source_rule,
            dependency.target_rule.bold(),
            dependency.key.yellow(),
            dependency.dependency_type
        );
    }

    println!();
    println!("{} ({})", "Temporal rules".bright_cyan(), analysis.temporal_rules.len());
    for rule in &analysis.temporal_rules {
        println!("  {}", rule.name);
    }
}

pub fn print_generated(scenarios: &[TestScenario]) {
    for scenario in scenarios {
        let steps = scenario.effective_steps().len();
        println!("  {} {} ({} steps)", "+".green(), scenario.name, steps);
    }
}

fn print_result(result: &ScenarioResult) {
    let status = if result.success {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    println!("  {} {} ({} ms)", status, result.name, result.duration_ms);
}

pub fn print_summary(summary: &RunSummary, verbose: bool) {
    println!();
    for result in &summary.results {
        print_result(result);
    }

    println!();
    let tally = format!(
        "{} total, {} passed, {} failed in {} ms",
        summary.total, summary.passed, summary.failed, summary.duration_ms
    );
    if summary.all_passed() {
        println!("{} {}", "OK".green().bold(), tally);
    } else {
        println!("{} {}", "FAILED".red().bold(), tally);
        let report = summary.failure_report();
        if verbose {
            println!();
            print!("{}", report);
        } else {
            for result in summary.results.iter().filter(|r| !r.success) {
                let step = result
                    .failed_step()
                    .map(|s| s.name.as_str())
                    .unwrap_or("setup");
                println!("  {} {} at {}", "x".red(), result.name, step);
            }
            println!("Run with --verbose for expected/actual details");
        }
    }
}
