//! JSON dumps and the Markdown report.
//!
//! The JSON intermediate maps an estimator kind to its records and is both an
//! output of a collection run and a valid input for re-reporting.

use crate::error::{Error, Result};
use crate::estimation::{
    above_threshold, group_by_kind, worst_k, EstimationRecord, EstimationSummary, PercentileStats,
    BUCKET_LABELS,
};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const REPORT_FILE: &str = "report.md";
pub const DUMP_FILE: &str = "estimations.json";
const GLOBAL_SECTION: &str = "all";

/// Renders a bar chart of bucket counts into an image file.
pub trait ChartRenderer {
    /// File extension of the produced images.
    fn extension(&self) -> &str;

    fn render(&self, title: &str, labels: &[&str], counts: &[u64], path: &Path) -> Result<()>;
}

/// Minimal SVG bar chart.
#[derive(Debug, Clone, Copy)]
pub struct SvgChart {
    pub width: u32,
    pub height: u32,
}

impl Default for SvgChart {
    fn default() -> Self {
        Self {
            width: 960,
            height: 360,
        }
    }
}

impl ChartRenderer for SvgChart {
    fn extension(&self) -> &str {
        "svg"
    }

    fn render(&self, title: &str, labels: &[&str], counts: &[u64], path: &Path) -> Result<()> {
        if labels.len() != counts.len() {
            return Err(Error::Report(format!(
                "{} labels for {} buckets",
                labels.len(),
                counts.len()
            )));
        }

        let top = 30.0;
        let bottom = 80.0;
        let plot_height = f64::from(self.height) - top - bottom;
        let slot = f64::from(self.width) / counts.len().max(1) as f64;
        let peak = counts.iter().copied().max().unwrap_or(0).max(1) as f64;

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" font-family="sans-serif" font-size="10">"#,
            self.width, self.height
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="18" text-anchor="middle" font-size="14">{}</text>"#,
            self.width / 2,
            escape_xml(title)
        );
        for (i, (label, &count)) in labels.iter().zip(counts).enumerate() {
            let bar = count as f64 / peak * plot_height;
            let x = i as f64 * slot;
            let y = top + plot_height - bar;
            let _ = writeln!(
                svg,
                r##"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="#4c78a8"/>"##,
                x + slot * 0.1,
                y,
                slot * 0.8,
                bar
            );
            let _ = writeln!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
                x + slot / 2.0,
                y - 4.0,
                count
            );
            let _ = writeln!(
                svg,
                r#"<text transform="translate({:.1},{:.1}) rotate(45)">{}</text>"#,
                x + slot / 4.0,
                top + plot_height + 12.0,
                escape_xml(label)
            );
        }
        svg.push_str("</svg>\n");

        fs::write(path, svg)?;
        Ok(())
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Write records grouped by kind, with `pError` populated.
pub fn write_json<P: AsRef<Path>>(records: &[EstimationRecord], path: P) -> Result<()> {
    let groups = group_by_kind(records);
    let json = serde_json::to_string_pretty(&groups)?;
    fs::write(path.as_ref(), json)?;
    Ok(())
}

/// Load a JSON dump. `pError` is recomputed from the counts.
pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Vec<EstimationRecord>> {
    let raw = fs::read_to_string(path.as_ref())?;
    let groups: BTreeMap<String, Vec<EstimationRecord>> = serde_json::from_str(&raw)?;
    let mut records: Vec<EstimationRecord> = groups.into_values().flatten().collect();
    for record in &mut records {
        record.refresh_p_error();
    }
    Ok(records)
}

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub worst_k: usize,
    pub p_error_threshold: f64,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            worst_k: 10,
            p_error_threshold: 100.0,
        }
    }
}

/// Files produced by [`write_report`].
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub report: PathBuf,
    pub dump: PathBuf,
    pub charts: Vec<PathBuf>,
}

/// Write the dump, one chart per section and the Markdown report into `out_dir`.
pub fn write_report<P: AsRef<Path>>(
    records: &[EstimationRecord],
    out_dir: P,
    options: ReportOptions,
    renderer: &dyn ChartRenderer,
) -> Result<ReportFiles> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;

    let dump = out_dir.join(DUMP_FILE);
    write_json(records, &dump)?;

    let mut sections: Vec<(String, Vec<EstimationRecord>)> =
        group_by_kind(records).into_iter().collect();
    sections.push((GLOBAL_SECTION.to_string(), records.to_vec()));

    let mut markdown = String::from("# Cardinality Estimation Report\n\n");
    let _ = writeln!(markdown, "Total records: {}\n", records.len());

    let mut charts = Vec::with_capacity(sections.len());
    for (name, group) in &sections {
        let summary = EstimationSummary::build(group);
        let chart_name = format!("{}.{}", file_stem(name), renderer.extension());
        let chart = out_dir.join(&chart_name);
        renderer.render(name, &BUCKET_LABELS, summary.histogram.counts(), &chart)?;
        charts.push(chart);

        render_section(&mut markdown, name, &chart_name, group, &summary, options);
    }

    let report = out_dir.join(REPORT_FILE);
    fs::write(&report, markdown)?;

    info!(
        records = records.len(),
        sections = sections.len(),
        path = %report.display(),
        "Report written"
    );
    Ok(ReportFiles {
        report,
        dump,
        charts,
    })
}

fn render_section(
    out: &mut String,
    name: &str,
    chart: &str,
    records: &[EstimationRecord],
    summary: &EstimationSummary,
    options: ReportOptions,
) {
    let _ = writeln!(out, "## {name}\n");
    let _ = writeln!(out, "![{name}]({chart})\n");
    let _ = writeln!(
        out,
        "Records: {}, exact estimations: {}\n",
        summary.total, summary.exact
    );

    let _ = writeln!(out, "### Distribution\n");
    out.push_str("| PError | Count |\n");
    out.push_str("|---|---|\n");
    for (label, count) in summary.histogram.labeled() {
        let _ = writeln!(out, "| {label} | {count} |");
    }
    out.push('\n');

    let _ = writeln!(out, "### Over-estimation\n");
    render_stats(out, &summary.over);
    let _ = writeln!(out, "### Under-estimation\n");
    render_stats(out, &summary.under);

    let _ = writeln!(out, "### Worst {}\n", options.worst_k);
    render_records(out, &worst_k(records, options.worst_k));

    let _ = writeln!(out, "### |PError| >= {}\n", options.p_error_threshold);
    render_records(out, &above_threshold(records, options.p_error_threshold));
}

fn render_stats(out: &mut String, stats: &PercentileStats) {
    out.push_str("| Total | P50 | P90 | P99 | Max |\n");
    out.push_str("|---|---|---|---|---|\n");
    let _ = writeln!(
        out,
        "| {} | {:.3} | {:.3} | {:.3} | {:.3} |\n",
        stats.total, stats.p50, stats.p90, stats.p99, stats.max
    );
}

fn render_records(out: &mut String, records: &[EstimationRecord]) {
    out.push_str("| Type | Expression | Estimated | Actual | PError | QError |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for record in records {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {:.3} | {:.3} |",
            record.kind,
            record.expr.replace('|', "\\|"),
            record.estimated,
            record.actual,
            record.p_error,
            record.q_error()
        );
    }
    out.push('\n');
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Vec<EstimationRecord> {
        vec![
            EstimationRecord::new("t.a > 1", "Column Stats-Range", 100, 50),
            EstimationRecord::new("t.a < 9", "Column Stats-Range", 50, 100),
            EstimationRecord::new("t.b = 3", "Index Stats-Point", 1, 1),
            EstimationRecord::new("t.b = 4", "Index Stats-Point", 0, 900),
        ]
    }

    #[test]
    fn test_json_dump_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.json");
        write_json(&sample(), &path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["Index Stats-Point"].as_array().unwrap().len(), 2);
        assert_eq!(raw["Column Stats-Range"][0]["pError"], 1.0);

        let mut loaded = load_json(&path).unwrap();
        loaded.sort_by(|a, b| a.expr.cmp(&b.expr));
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[3].p_error, -900.0);
    }

    #[test]
    fn test_load_without_p_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.json");
        fs::write(
            &path,
            r#"{"Column Stats-Range": [{"Expr": "x", "Type": "Column Stats-Range", "Est": 10, "Actual": 5}]}"#,
        )
        .unwrap();
        let loaded = load_json(&path).unwrap();
        assert_eq!(loaded[0].p_error, 1.0);
    }

    #[test]
    fn test_report_sections() {
        let dir = tempdir().unwrap();
        let files = write_report(
            &sample(),
            dir.path(),
            ReportOptions {
                worst_k: 2,
                p_error_threshold: 500.0,
            },
            &SvgChart::default(),
        )
        .unwrap();

        assert_eq!(files.charts.len(), 3);
        for chart in &files.charts {
            assert!(fs::read_to_string(chart).unwrap().starts_with("<svg"));
        }
        assert!(files.dump.exists());

        let report = fs::read_to_string(&files.report).unwrap();
        assert!(report.contains("## Column Stats-Range"));
        assert!(report.contains("## Index Stats-Point"));
        assert!(report.contains("## all"));
        assert!(report.contains("![all](all.svg)"));
        assert!(report.contains("### Over-estimation"));
        assert!(report.contains("### Worst 2"));
        assert!(report.contains("| Index Stats-Point | t.b = 4 | 0 | 900 | -900.000 | 901.000 |"));
        assert!(report.contains("### Distribution"));
        assert!(report.contains("| [-1,1] | 1 |"));
        assert!(report.contains("| (-inf,-6561) | 0 |"));
    }

    #[test]
    fn test_chart_label_mismatch() {
        let dir = tempdir().unwrap();
        let err = SvgChart::default()
            .render("x", &["a"], &[1, 2], &dir.path().join("x.svg"))
            .unwrap_err();
        assert!(matches!(err, Error::Report(_)));
    }
}
