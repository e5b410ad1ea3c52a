use std::io::{self, Write};

use shift_forge::RunSummary;
use shift_forge::predict::{DispatchReport, Registry};

use crate::util::text::{plural, truncate};

const INDENT: &str = "      ";

const BOX_INNER_WIDTH: usize = 62;
const SAFE_TABLE_WIDTH: usize = BOX_INNER_WIDTH - INDENT.len();
const MAX_CELL_WIDTH: usize = 24;

pub fn print_run_summary(summary: &RunSummary) {
    let stderr = io::stderr();
    let mut out = stderr.lock();

    let normalized = &summary.normalized;
    let mut rows = vec![
        ("Input Rows", format!("{}", normalized.rows_written)),
        ("Malformed Rows", format!("{}", normalized.malformed.len())),
        ("Duplicate Ids", format!("{}", summary.duplicates.len())),
    ];

    if let Some(embedding) = &summary.embedding {
        rows.push(("Geometries", format!("{}", embedding.written())));
        rows.push(("  degraded", format!("{}", embedding.degraded())));
        rows.push(("  via layout tool", format!("{}", embedding.routed_external())));
        rows.push(("  failed", format!("{}", embedding.failed())));
    }
    if let Some(fingerprints) = &summary.fingerprints {
        rows.push(("Fingerprints", format!("{}", fingerprints.written.len())));
        rows.push(("  failed", format!("{}", fingerprints.failures.len())));
    }
    for matrix in &summary.matrices {
        rows.push((
            matrix.representation.tag(),
            matrix_shape(matrix.headed.rows, matrix.headed.feature_count),
        ));
    }
    if let Some(hybrid) = &summary.hybrid {
        rows.push(("hybrid", matrix_shape(hybrid.rows, hybrid.feature_count)));
    }
    rows.push(("Skipped Models", format!("{}", summary.dispatch.skipped.len())));

    print_kv_table(&mut out, "Run Summary", &rows);
}

fn matrix_shape(rows: usize, features: usize) -> String {
    format!("{} × {}", plural(rows, "row"), plural(features, "feature"))
}

/// Per-structure averages and deviations, one column pair per property.
pub fn print_results(report: &DispatchReport) {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if report.structures.is_empty() {
        let _ = writeln!(out, "{}No predictions were produced.", INDENT);
        return;
    }

    let mut header = vec!["MOLECULE_NAME".to_string()];
    for property in &report.properties {
        header.push(format!("{property} Average"));
        header.push(format!("{property} StdDev"));
    }

    let rows: Vec<Vec<String>> = report
        .structures
        .iter()
        .map(|structure| {
            let mut row = vec![structure.id.clone()];
            for property in &report.properties {
                match structure.property(property) {
                    Some(p) => {
                        row.push(format!("{:.2}", p.average));
                        row.push(format!("{:.2}", p.std_dev));
                    }
                    None => {
                        row.push("-".to_string());
                        row.push("-".to_string());
                    }
                }
            }
            row
        })
        .collect();

    print_grid(&mut out, "Prediction Results", &header, &rows);
    if let Some(summary) = &report.summary {
        let _ = writeln!(out, "{}Saved to {}", INDENT, summary.display());
    }
}

/// The model registry without artifact paths.
pub fn print_registry(registry: &Registry) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let (header, rows) = registry.display_table();
    print_grid(&mut out, "Models", &header, &rows);
}

fn print_grid(out: &mut impl Write, title: &str, header: &[String], rows: &[Vec<String>]) {
    let widths: Vec<usize> = (0..header.len())
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .chain(std::iter::once(&header[col]))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
                .min(MAX_CELL_WIDTH)
        })
        .collect();
    let rule = |left: &str, mid: &str, right: &str| {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{INDENT}{left}{}{right}", segments.join(mid))
    };
    let line = |cells: &[String]| {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(col, w)| {
                let cell = truncate(cells.get(col).map_or("", String::as_str), *w);
                if col == 0 {
                    format!(" {cell:<w$} ")
                } else {
                    format!(" {cell:>w$} ")
                }
            })
            .collect();
        format!("{INDENT}│{}│", padded.join("│"))
    };

    let _ = writeln!(
        out,
        "{}┌─ {} ─┐",
        INDENT,
        truncate(title, SAFE_TABLE_WIDTH - 6)
    );
    let _ = writeln!(out, "{}", rule("┌", "┬", "┐"));
    let _ = writeln!(out, "{}", line(header));
    let _ = writeln!(out, "{}", rule("├", "┼", "┤"));
    for row in rows {
        let _ = writeln!(out, "{}", line(row.as_slice()));
    }
    let _ = writeln!(out, "{}", rule("└", "┴", "┘"));
}

fn print_kv_table(out: &mut impl Write, title: &str, rows: &[(&str, String)]) {
    let key_w = 16usize;
    let sep_overhead = 6;
    let val_w = SAFE_TABLE_WIDTH.saturating_sub(key_w + sep_overhead);

    let _ = writeln!(
        out,
        "{}┌─ {} ─┐",
        INDENT,
        truncate(title, SAFE_TABLE_WIDTH - 6)
    );
    let _ = writeln!(
        out,
        "{}┌{k_line}┬{v_line}┐",
        INDENT,
        k_line = "─".repeat(key_w + 2),
        v_line = "─".repeat(val_w + 2)
    );
    let _ = writeln!(
        out,
        "{}│ {:<key_w$} │ {:>val_w$} │",
        INDENT,
        "Metric",
        "Value",
        key_w = key_w,
        val_w = val_w
    );
    let _ = writeln!(
        out,
        "{}├{k_line}┼{v_line}┤",
        INDENT,
        k_line = "─".repeat(key_w + 2),
        v_line = "─".repeat(val_w + 2)
    );

    for (key, val) in rows {
        let _ = writeln!(
            out,
            "{}│ {:<key_w$} │ {:>val_w$} │",
            INDENT,
            truncate(key, key_w),
            truncate(val, val_w),
            key_w = key_w,
            val_w = val_w
        );
    }

    let _ = writeln!(
        out,
        "{}└{k_line}┴{v_line}┘",
        INDENT,
        k_line = "─".repeat(key_w + 2),
        v_line = "─".repeat(val_w + 2)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(header: &[&str], rows: &[&[&str]]) -> String {
        let header: Vec<String> = header.iter().map(|s| s.to_string()).collect();
        let rows: Vec<Vec<String>> = rows
            .iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect();
        let mut buf = Vec::new();
        print_grid(&mut buf, "Models", &header, &rows);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn matrix_shape_pluralizes_counts() {
        assert_eq!(matrix_shape(1, 250), "1 row × 250 features");
        assert_eq!(matrix_shape(3, 1), "3 rows × 1 feature");
    }

    #[test]
    fn grid_columns_fit_the_widest_cell() {
        let text = render(&["model_name", "R2"], &[&["DNN_logD", "0.8123"], &["SVR", "0.7"]]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[2].contains("│ model_name │     R2 │"));
        assert!(lines[4].contains("│ DNN_logD   │ 0.8123 │"));
        assert!(lines[5].contains("│ SVR        │    0.7 │"));
        let widths: Vec<usize> = lines[1..].iter().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn long_cells_are_truncated() {
        let long = "a".repeat(40);
        let text = render(&["id"], &[&[long.as_str()]]);
        assert!(text.contains(&format!("{}…", "a".repeat(MAX_CELL_WIDTH - 1))));
    }
}
