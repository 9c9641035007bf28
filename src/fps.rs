use std::path::Path;

use vvc::utils::timing::FrameRate;

const RATE_MARKERS: [&str; 5] = ["Hz", "HZ", "hz", "fps", "FPS"];

/// Looks for a frame rate written into the input path, e.g. `clip_60fps.266`
/// or `/captures/50Hz/seq.bin`. Only the digits directly in front of the
/// first marker found are considered.
pub fn frame_rate_from_path(path: &Path) -> Option<FrameRate> {
    let path = path.to_string_lossy();

    let (pos, _) = RATE_MARKERS
        .iter()
        .filter_map(|marker| path.find(marker).map(|pos| (pos, *marker)))
        .min_by_key(|(pos, _)| *pos)?;

    let head = &path[..pos];
    let digits_start = head
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);

    let fps: u32 = head[digits_start..].parse().ok()?;
    if fps == 0 {
        return None;
    }

    log::debug!("Found frame rate in path: {fps} fps");
    Some(FrameRate::from_fps(fps as f64))
}

/// Explicit `--fps` wins over the path; `None` keeps the 50/1 default.
pub fn resolve_frame_rate(explicit: Option<FrameRate>, input: &Path) -> Option<FrameRate> {
    let rate = explicit.or_else(|| frame_rate_from_path(input));

    match rate {
        Some(rate) => log::info!("Using frame rate {rate}"),
        None => log::info!(
            "No frame rate given, using default {}",
            FrameRate::default()
        ),
    }

    rate
}

#[test]
fn rates_in_paths() {
    let rate = |path: &str| frame_rate_from_path(Path::new(path)).map(|r| (r.num(), r.den()));

    assert_eq!(rate("clip_60fps.266"), Some((60, 1)));
    assert_eq!(rate("/streams/50Hz/seq.bin"), Some((50, 1)));
    assert_eq!(rate("BQTerrace_1920x1080_60hz.h266"), Some((60, 1)));
    assert_eq!(rate("Test_24FPS"), Some((24, 1)));
    assert_eq!(rate("plain.266"), None);
    assert_eq!(rate("fps.266"), None);
    assert_eq!(rate("0fps.266"), None);
}

#[test]
fn explicit_rate_wins() -> anyhow::Result<()> {
    let explicit: FrameRate = "30000/1001".parse()?;
    let rate = resolve_frame_rate(Some(explicit), Path::new("clip_60fps.266"));
    assert_eq!(rate, Some(explicit));
    Ok(())
}
