//! Vulkan CTS results to static HTML.
//!
//! [`generate_report`] reads a raw CTS log or an XML results file, extracts every
//! `<TestCaseResult>`, and writes pages of [`html::PAGE_SIZE`] rows next to the requested output.
//! The requested path itself receives page 1.

pub mod error;
pub mod html;
pub mod message;
pub mod parse;
pub mod stats;

pub use error::ReportError;
pub use parse::{InputKind, TestCase};
pub use stats::Statistics;

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub input_kind: InputKind,
    pub statistics: Statistics,
    pub output: PathBuf,
    /// `<stem>_page_<n>.html` files in page order.
    pub pages: Vec<PathBuf>,
}

pub fn generate_report(input: &Path, output: &Path) -> Result<ReportSummary, ReportError> {
    if !input.exists() {
        return Err(ReportError::InputMissing {
            path: input.to_path_buf(),
        });
    }
    let bytes = fs::read(input).map_err(|source| ReportError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);
    let input_kind = InputKind::detect(&content);
    log::info!("detected {} input", input_kind);

    let cases = parse::parse_cases(&content, input_kind)?;
    if cases.is_empty() {
        return Err(ReportError::NoResults {
            path: input.to_path_buf(),
        });
    }
    let statistics = Statistics::from_cases(&cases);
    log::debug!("{} test cases parsed", cases.len());

    let pages = write_pages(&cases, &statistics, output)?;
    log::info!("HTML report saved to {}", output.display());
    Ok(ReportSummary {
        input_kind,
        statistics,
        output: output.to_path_buf(),
        pages,
    })
}

fn write_pages(cases: &[TestCase], statistics: &Statistics, output: &Path) -> Result<Vec<PathBuf>, ReportError> {
    let dir = output.parent().unwrap_or(Path::new(""));
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir).map_err(|source| ReportError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let pie = html::pie_chart_svg(statistics);
    let page_total = html::page_count(cases.len());
    let mut pages = Vec::with_capacity(page_total);
    for (index, rows) in cases.chunks(html::PAGE_SIZE).enumerate() {
        let page = index + 1;
        let body = html::render_page(rows, page, page_total, &stem, statistics, &pie);
        let path = dir.join(html::page_file_name(&stem, page));
        write_file(&path, &body)?;
        if page == 1 && path != output {
            write_file(output, &body)?;
        }
        log::debug!("wrote {}", path.display());
        pages.push(path);
    }
    Ok(pages)
}

fn write_file(path: &Path, body: &str) -> Result<(), ReportError> {
    fs::write(path, body).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}
