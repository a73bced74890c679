use std::fmt;
use std::time::Duration;

use crate::domain::Bucket;
use crate::stats::StatsSnapshot;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human size with 1024-based units: two decimals below 10, one above.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value < 10.0 {
        format!("{value:.2} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// What one invocation of the driver did, plus the cumulative totals.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub discovered: u64,
    /// Files transformed by this invocation.
    pub processed: u64,
    pub skipped: u64,
    pub copied_other: u64,
    pub enumeration_errors: u64,
    pub resumed: bool,
    pub checkpoint_discarded: bool,
    pub resume_count: u32,
    pub totals: StatsSnapshot,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn space_saved_percentage(&self) -> f64 {
        percent(self.totals.bytes_saved, self.totals.original_bytes)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.totals;
        writeln!(f, "batch complete in {:.1}s", self.elapsed.as_secs_f64())?;
        if self.resumed {
            writeln!(f, "  resumed from checkpoint (resume #{})", self.resume_count)?;
        }
        if self.checkpoint_discarded {
            writeln!(f, "  previous checkpoint was unusable and was ignored")?;
        }
        writeln!(f, "  discovered:          {}", self.discovered)?;
        writeln!(f, "  processed this run:  {}", self.processed)?;
        writeln!(f, "  skipped:             {}", self.skipped)?;
        if self.copied_other > 0 {
            writeln!(f, "  other files copied:  {}", self.copied_other)?;
        }
        if self.enumeration_errors > 0 {
            writeln!(f, "  unreadable entries:  {}", self.enumeration_errors)?;
        }
        writeln!(f, "  attempted in total:  {}", t.attempted)?;
        for b in Bucket::ALL {
            let n = t.buckets.get(b);
            writeln!(
                f,
                "    {:<10} {:>8} ({:.1}%)",
                b.as_str(),
                n,
                percent(n, t.attempted)
            )?;
        }
        for (kind, n) in &t.errors {
            writeln!(f, "    {:<18} {n}", kind.as_str())?;
        }
        writeln!(f, "  original size:       {}", format_size(t.original_bytes))?;
        writeln!(f, "  final size:          {}", format_size(t.final_bytes))?;
        write!(
            f,
            "  space saved:         {} ({:.1}%)",
            format_size(t.bytes_saved),
            self.space_saved_percentage()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::stats::Counters;

    #[test]
    fn sizes_switch_precision_at_ten() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(10 * 1024), "10.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.00 GB");
        assert_eq!(format_size(2048 * 1024u64.pow(4)), "2048.0 TB");
    }

    #[test]
    fn summary_lists_every_bucket_and_error_kind() {
        let mut totals = Counters::default();
        totals.attempted = 4;
        totals.buckets.excellent = 3;
        totals.buckets.error = 1;
        totals.errors.insert(ErrorKind::EmptyInput, 1);
        totals.original_bytes = 4096;
        totals.final_bytes = 2048;
        totals.bytes_saved = 2048;
        let r = RunReport {
            discovered: 4,
            processed: 4,
            skipped: 0,
            copied_other: 0,
            enumeration_errors: 0,
            resumed: false,
            checkpoint_discarded: false,
            resume_count: 0,
            totals,
            elapsed: Duration::from_millis(1500),
        };
        let text = r.to_string();
        for b in Bucket::ALL {
            assert!(text.contains(b.as_str()), "missing {b:?} in {text}");
        }
        assert!(text.contains("empty-input"));
        assert!(text.contains("space saved:         2.00 KB (50.0%)"));
        assert!(!text.contains("resumed"));
    }
}
