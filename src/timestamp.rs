use vvc::utils::timing::CLOCK_FREQ;

pub fn time_str(sec: f64) -> String {
    let ms = sec * 1000f64;
    let hours = (ms / 3600000f64) as u64;
    let minutes = ((ms % 3600000f64) / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

/// Formats a stream timestamp in microseconds. Negative values get a sign.
pub fn ts_str(us: i64) -> String {
    let sign = if us < 0 { "-" } else { "" };
    let sec = us.unsigned_abs() as f64 / CLOCK_FREQ as f64;
    format!("{sign}{}", time_str(sec))
}

#[test]
fn formats_stream_times() {
    assert_eq!(time_str(0.0), "00:00:00.000");
    assert_eq!(time_str(3725.5), "01:02:05.500");
    assert_eq!(ts_str(40_000), "00:00:00.040");
    assert_eq!(ts_str(-1_500_000), "-00:00:01.500");
}
