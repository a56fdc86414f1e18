//! Result tables using comfy-table.

use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use sweep_sort::KeyType;

use crate::harness::{format_key, format_size, BenchResult, CheckResult};

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn status_cell(check: &CheckResult) -> Cell {
    if check.skipped {
        Cell::new("SKIP").fg(Color::Yellow)
    } else if check.passed() {
        Cell::new("PASS").fg(Color::Green)
    } else {
        Cell::new("FAIL").fg(Color::Red)
    }
}

pub fn checks_table(checks: &[CheckResult]) -> Table {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&["Suite", "Check", "Kernels", "Sizes", "Runs", "Failures", "Time (ms)", "Status"]));

    for check in checks {
        table.add_row(vec![
            Cell::new(check.suite),
            Cell::new(&check.name),
            Cell::new(&check.kernels),
            Cell::new(&check.sizes).set_alignment(CellAlignment::Right),
            Cell::new(check.runs).set_alignment(CellAlignment::Right),
            Cell::new(check.failures).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.1}", check.elapsed_ms)).set_alignment(CellAlignment::Right),
            status_cell(check),
        ]);
    }
    table
}

pub fn bench_table(results: &[BenchResult]) -> Table {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&[
            "Strategy", "Kernels", "Size", "Entropy", "Median (ms)", "Min (ms)", "Max (ms)", "CV%", "Mkeys/s", "Errors",
        ]));

    for r in results {
        let errors = if r.errors == 0 {
            Cell::new(0).fg(Color::Green)
        } else {
            Cell::new(r.errors).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&r.strategy),
            Cell::new(&r.kernels),
            Cell::new(format_size(r.size)).set_alignment(CellAlignment::Right),
            Cell::new(&r.entropy),
            Cell::new(format!("{:.3}", r.stats.median)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.3}", r.stats.min)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.3}", r.stats.max)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.1}", r.stats.cv_percent)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.1}", r.keys_per_sec / 1e6)).set_alignment(CellAlignment::Right),
            errors.set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Index and value of each key read back after a sort.
pub fn keys_table(key_type: KeyType, keys: &[u64]) -> Table {
    let mut table = Table::new();
    table.set_header(header(&["Index", "Key", "Bits"]));
    let width = 2 + key_type.bits() as usize / 4;
    for (i, &bits) in keys.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i).set_alignment(CellAlignment::Right),
            Cell::new(format_key(key_type, bits)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{bits:#0width$x}")),
        ]);
    }
    table
}

pub fn render_checks(checks: &[CheckResult]) {
    if checks.is_empty() {
        println!("No checks ran.");
        return;
    }
    println!("{}", checks_table(checks));
    let failed = checks.iter().filter(|c| !c.passed()).count();
    let skipped = checks.iter().filter(|c| c.skipped).count();
    println!(
        "{} checks: {} passed, {} failed, {} skipped",
        checks.len(),
        checks.len() - failed - skipped,
        failed,
        skipped
    );
}

pub fn render_bench(results: &[BenchResult]) {
    if results.is_empty() {
        println!("No results to display.");
        return;
    }
    println!("{}", bench_table(results));
}
