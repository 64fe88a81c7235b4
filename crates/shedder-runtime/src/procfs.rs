//! Machine-wide CPU time from `/proc/stat`

use std::path::Path;

use shedder_core::{ShedError, ShedResult};

use crate::fs::ControlFs;

/// `cpu` line columns summed into busy+idle time:
/// user nice system idle iowait irq softirq
const CPU_FIELDS: usize = 7;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Cumulative CPU time of all CPUs since boot, in nanoseconds.
///
/// `clock_ticks` is the kernel's USER_HZ (see `platform::clock_ticks`).
pub fn system_cpu_usage_ns<F: ControlFs>(fs: &F, proc_stat: &Path, clock_ticks: u64) -> ShedResult<u64> {
    let content = fs.read_to_string(proc_stat)?;
    let ticks = parse_cpu_ticks(&content)?;
    Ok(ticks_to_ns(ticks, clock_ticks))
}

/// Sum of the first seven columns of the aggregate `cpu` line.
pub fn parse_cpu_ticks(content: &str) -> ShedResult<u64> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| ShedError::malformed("/proc/stat", "no aggregate cpu line"))?;

    let fields: Vec<&str> = line.split_whitespace().skip(1).take(CPU_FIELDS).collect();
    if fields.len() < CPU_FIELDS {
        return Err(ShedError::malformed("cpu stats", line));
    }

    fields.iter().try_fold(0u64, |acc, f| {
        let v: u64 = f.parse().map_err(|_| ShedError::malformed("cpu stats", *f))?;
        Ok(acc.saturating_add(v))
    })
}

pub fn ticks_to_ns(ticks: u64, clock_ticks: u64) -> u64 {
    let hz = clock_ticks.max(1) as u128;
    (ticks as u128 * NANOS_PER_SEC / hz).min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mem::MemFs;

    const STAT: &str = "cpu  100 5 50 1000 20 3 2 0 0 0\n\
                        cpu0 50 2 25 500 10 1 1 0 0 0\n\
                        cpu1 50 3 25 500 10 2 1 0 0 0\n\
                        intr 12345\n";

    #[test]
    fn test_parse_cpu_ticks() {
        assert_eq!(parse_cpu_ticks(STAT), Ok(100 + 5 + 50 + 1000 + 20 + 3 + 2));
    }

    #[test]
    fn test_ignores_per_cpu_lines() {
        let per_cpu_only = "cpu0 1 2 3 4 5 6 7\n";
        assert!(parse_cpu_ticks(per_cpu_only).is_err());
    }

    #[test]
    fn test_short_cpu_line() {
        assert!(matches!(
            parse_cpu_ticks("cpu 1 2 3\n"),
            Err(ShedError::Malformed { what: "cpu stats", .. })
        ));
    }

    #[test]
    fn test_non_numeric_field() {
        assert!(parse_cpu_ticks("cpu 1 2 x 4 5 6 7\n").is_err());
    }

    #[test]
    fn test_ticks_to_ns() {
        assert_eq!(ticks_to_ns(100, 100), 1_000_000_000);
        assert_eq!(ticks_to_ns(1, 250), 4_000_000);
        assert_eq!(ticks_to_ns(5, 0), 5_000_000_000);
    }

    #[test]
    fn test_system_cpu_usage_ns() {
        let fs = MemFs::new().with("/proc/stat", STAT);
        let ns = system_cpu_usage_ns(&fs, Path::new("/proc/stat"), 100).unwrap();
        assert_eq!(ns, 1180 * 10_000_000);
    }
}
