//! Reporting helpers
//!
//! Human-readable time and speed formatting for progress lines, the
//! timestamp used in auto-generated dump and traceback file names, and
//! the local hostname for failure records.

/// Format a duration in seconds as `hh:mm:ss`.
pub fn humanize_time(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    let (hours, rest) = (total / 3600, total % 3600);
    format!("{:02}:{:02}:{:02}", hours, rest / 60, rest % 60)
}

/// Format a rate in counts per second, scaling down to counts per
/// minute, hour, or day until the value is at least one.
pub fn humanize_speed(counts_per_sec: f64) -> String {
    const SCALES: [f64; 3] = [60.0, 60.0, 24.0];
    const UNITS: [&str; 4] = ["c/s", "c/min", "c/h", "c/d"];
    let mut speed = counts_per_sec;
    let mut unit = 0;
    if speed > 0.0 {
        while speed < 1.0 && unit < SCALES.len() {
            speed *= SCALES[unit];
            unit += 1;
        }
    }
    format!("{speed:.1}{}", UNITS[unit])
}

/// Local-time stamp for file names: `YYYY_MM_DD_hh_mm_ss`.
pub fn filename_timestamp() -> String {
    chrono::Local::now().format("%Y_%m_%d_%H_%M_%S").to_string()
}

/// This machine's hostname, or a placeholder when it cannot be read.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_owned())
}
