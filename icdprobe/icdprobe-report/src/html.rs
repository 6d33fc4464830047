//! Static HTML pages: header, stat cards, pie chart, pagination and the result table.

use crate::message::{escape_html, format_message};
use crate::parse::TestCase;
use crate::stats::{Statistics, FAIL, NOT_SUPPORTED, PASS};
use std::f64::consts::TAU;
use std::fmt::Write;

pub const PAGE_SIZE: usize = 100;

/// Pages shown on each side of the current one.
const PAGINATION_WINDOW: usize = 2;

const STYLE: &str = include_str!("report.css");

const PIE_CENTER: f64 = 100.0;
const PIE_RADIUS: f64 = 80.0;
const PASS_COLOR: &str = "#22c55e";
const FAIL_COLOR: &str = "#f97373";
const NOT_SUPPORTED_COLOR: &str = "#eab308";
const OTHER_COLOR: &str = "#64748b";

pub fn page_count(total: usize) -> usize {
    total.div_ceil(PAGE_SIZE)
}

/// `<stem>_page_<n>.html`, 1-based.
pub fn page_file_name(stem: &str, page: usize) -> String {
    format!("{stem}_page_{page}.html")
}

pub fn status_pill(status: &str) -> String {
    let class = match status {
        PASS | FAIL | NOT_SUPPORTED => format!(" status-{status}"),
        _ => String::new(),
    };
    format!(r#"<span class="status-pill{class}">{}</span>"#, escape_html(status))
}

fn pie_point(fraction: f64) -> (f64, f64) {
    let angle = fraction * TAU;
    (PIE_CENTER + PIE_RADIUS * angle.cos(), PIE_CENTER + PIE_RADIUS * angle.sin())
}

/// Pie of the four status classes. Empty for an empty run.
pub fn pie_chart_svg(stats: &Statistics) -> String {
    if stats.total == 0 {
        return String::new();
    }
    let segments = [
        ("Pass", stats.pass, PASS_COLOR),
        ("Fail", stats.fail, FAIL_COLOR),
        ("Not Supported", stats.not_supported, NOT_SUPPORTED_COLOR),
        ("Other", stats.other, OTHER_COLOR),
    ];
    let mut shapes = Vec::new();
    let mut start = 0.0;
    for (name, count, color) in segments {
        if count == 0 {
            continue;
        }
        let title = format!("<title>{name}: {count} ({:.1}%)</title>", stats.percent(count));
        // A single class would be a zero-length arc.
        if count == stats.total {
            shapes.push(format!(
                r#"<circle cx="{PIE_CENTER}" cy="{PIE_CENTER}" r="{PIE_RADIUS}" fill="{color}" opacity="0.9">{title}</circle>"#
            ));
            break;
        }
        let fraction = count as f64 / stats.total as f64;
        let end = start + fraction;
        let (x1, y1) = pie_point(start);
        let (x2, y2) = pie_point(end);
        let large_arc = u8::from(fraction > 0.5);
        shapes.push(format!(
            r#"<path d="M {PIE_CENTER} {PIE_CENTER} L {x1:.3} {y1:.3} A {PIE_RADIUS} {PIE_RADIUS} 0 {large_arc} 1 {x2:.3} {y2:.3} Z" fill="{color}" opacity="0.9" stroke="rgba(255,255,255,0.1)" stroke-width="1">{title}</path>"#
        ));
        start = end;
    }
    format!(
        "<svg viewBox=\"0 0 200 200\" class=\"pie-chart\">\n{}\n</svg>",
        shapes.join("\n")
    )
}

/// Navigation for `page` of `pages`: First/Prev, a window around the current page, Next/Last.
pub fn pagination(page: usize, pages: usize, stem: &str) -> String {
    let link = |target: usize, label: &str| {
        format!(
            r#"<a href="{}" class="pag-link">{label}</a>"#,
            escape_html(&page_file_name(stem, target))
        )
    };
    let disabled = |label: &str| format!(r#"<span class="pag-link disabled">{label}</span>"#);
    let ellipsis = r#"<span class="pag-ellipsis">…</span>"#.to_string();

    let mut links = Vec::new();
    if page > 1 {
        links.push(link(1, "First"));
        links.push(link(page - 1, "Prev"));
    } else {
        links.push(disabled("First"));
        links.push(disabled("Prev"));
    }

    let first = page.saturating_sub(PAGINATION_WINDOW).max(1);
    let last = (page + PAGINATION_WINDOW).min(pages);
    if first > 1 {
        links.push(ellipsis.clone());
    }
    for p in first..=last {
        if p == page {
            links.push(format!(r#"<span class="pag-link active">{p}</span>"#));
        } else {
            links.push(link(p, &p.to_string()));
        }
    }
    if last < pages {
        links.push(ellipsis);
    }

    if page < pages {
        links.push(link(page + 1, "Next"));
        links.push(link(pages, "Last"));
    } else {
        links.push(disabled("Next"));
        links.push(disabled("Last"));
    }

    format!(
        r#"<nav class="pagination">
  <span class="pagination-summary">Page {page} of {pages}</span>
  <div class="pagination-links">{}</div>
</nav>"#,
        links.join(" ")
    )
}

fn results_table(cases: &[TestCase]) -> String {
    let mut table = String::from(
        r#"<table class="cts-table" id="results-table">
<thead><tr><th>Test Case</th><th>Duration (µs)</th><th>Status</th><th>Message</th></tr></thead>
<tbody>
"#,
    );
    for case in cases {
        let _ = writeln!(
            table,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&case.case_path),
            case.duration_us,
            status_pill(&case.status),
            format_message(&case.message)
        );
    }
    table.push_str("</tbody>\n</table>");
    table
}

fn stat_card(title: &str, value_class: &str, value: &str, label: &str) -> String {
    format!(
        r#"<div class="stat-card">
  <div class="stat-card-header">{title}</div>
  <div class="stat-value {value_class}">{value}</div>
  <div class="stat-label">{label}</div>
</div>"#
    )
}

/// One complete page. `cases` holds only this page's rows.
pub fn render_page(
    cases: &[TestCase],
    page: usize,
    pages: usize,
    stem: &str,
    stats: &Statistics,
    pie_svg: &str,
) -> String {
    let cards = [
        stat_card(
            "Passed",
            "stat-success",
            &stats.pass.to_string(),
            &format!("{:.1}% success rate", stats.pass_rate()),
        ),
        stat_card(
            "Failed",
            "stat-danger",
            &stats.fail.to_string(),
            &format!("{:.1}% of total", stats.percent(stats.fail)),
        ),
        stat_card(
            "Not Supported",
            "stat-warning",
            &stats.not_supported.to_string(),
            &format!("{:.1}% of total", stats.percent(stats.not_supported)),
        ),
        stat_card(
            "Duration",
            "stat-info",
            &stats.duration_label(),
            &format!("Avg: {:.0} µs/test", stats.average_duration_us()),
        ),
    ]
    .join("\n");
    let nav = pagination(page, pages, stem);
    let table = results_table(cases);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8" />
<title>Vulkan CTS Report – Page {page}/{pages}</title>
<style>
{STYLE}</style>
</head>
<body>
<div class="report-shell">
<div class="report-card">
<div class="report-header">
  <div>
    <h1>Vulkan CTS Report</h1>
    <p class="subtitle">Summary of test cases, status and timings</p>
  </div>
  <div class="badge">Total: {total} tests</div>
</div>
<div class="stats-grid">
{cards}
</div>
<div class="chart-container">
{pie_svg}
</div>
{nav}
<div class="table-wrapper">
{table}
</div>
<div class="footer-note">Generated by <code>cts_report</code></div>
</div>
</div>
</body>
</html>
"#,
        total = stats.total
    )
}
