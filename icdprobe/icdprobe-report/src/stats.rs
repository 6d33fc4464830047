use crate::parse::TestCase;
use std::fmt;

pub const PASS: &str = "Pass";
pub const FAIL: &str = "Fail";
pub const NOT_SUPPORTED: &str = "NotSupported";

/// Counts per status class plus summed durations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub not_supported: usize,
    /// Anything that is not one of the three named statuses.
    pub other: usize,
    pub total_duration_us: u64,
}

impl Statistics {
    pub fn from_cases(cases: &[TestCase]) -> Self {
        let mut stats = Statistics {
            total: cases.len(),
            ..Statistics::default()
        };
        for case in cases {
            match case.status.as_str() {
                PASS => stats.pass += 1,
                FAIL => stats.fail += 1,
                NOT_SUPPORTED => stats.not_supported += 1,
                _ => stats.other += 1,
            }
            stats.total_duration_us = stats.total_duration_us.saturating_add(case.duration_us);
        }
        stats
    }

    /// Share of `count` in the total, in percent. Zero for an empty run.
    pub fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }

    pub fn pass_rate(&self) -> f64 {
        self.percent(self.pass)
    }

    pub fn average_duration_us(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_duration_us as f64 / self.total as f64
        }
    }

    /// Seconds above one second, milliseconds otherwise.
    pub fn duration_label(&self) -> String {
        let seconds = self.total_duration_us as f64 / 1_000_000.0;
        if seconds > 1.0 {
            format!("{seconds:.2}s")
        } else {
            format!("{:.2}ms", self.total_duration_us as f64 / 1000.0)
        }
    }
}

/// Console summary printed after a report is written.
impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Test Statistics ---")?;
        writeln!(f, "Total tests:      {}", self.total)?;
        writeln!(f, "Passed:           {} ({:.1}%)", self.pass, self.pass_rate())?;
        writeln!(f, "Failed:           {} ({:.1}%)", self.fail, self.percent(self.fail))?;
        writeln!(
            f,
            "Not Supported:    {} ({:.1}%)",
            self.not_supported,
            self.percent(self.not_supported)
        )?;
        if self.other > 0 {
            writeln!(f, "Other:            {} ({:.1}%)", self.other, self.percent(self.other))?;
        }
        writeln!(f, "Total Duration:   {}", self.duration_label())?;
        write!(f, "Average Duration: {:.0} µs/test", self.average_duration_us())
    }
}
