//! Frame timestamps in `H:MM:SS.d` form.
//!
//! A frame's timestamp is `(index - 1) / fps` seconds, with the tenth of a
//! second truncated. Hours are not wrapped into days.

/// Slack in tenths absorbed before truncating, so frames that sit exactly on
/// a tenth boundary at rational rates (24000/1001) are not pushed below it.
const BOUNDARY_SLACK: f64 = 1e-6;

/// Seconds offset of a 1-based frame index, in whole tenths (truncated).
pub fn frame_tenths(index: u64, fps: f64) -> u64 {
    let seconds = index.saturating_sub(1) as f64 / fps;
    let tenths = seconds * 10.0 + BOUNDARY_SLACK;
    if tenths.is_finite() && tenths > 0.0 {
        tenths.floor() as u64
    } else {
        0
    }
}

/// Format whole tenths of a second as `H:MM:SS.d`.
pub fn format_tenths(tenths: u64) -> String {
    let seconds_total = tenths / 10;
    let hours = seconds_total / 3600;
    let minutes = (seconds_total % 3600) / 60;
    let seconds = seconds_total % 60;
    format!("{}:{:02}:{:02}.{}", hours, minutes, seconds, tenths % 10)
}

/// Timestamp for a 1-based frame index at `fps`.
pub fn frame_timestamp(index: u64, fps: f64) -> String {
    format_tenths(frame_tenths(index, fps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_to_tenths() {
        assert_eq!(frame_timestamp(15, 30.0), "0:00:00.4");
        assert_eq!(frame_timestamp(30, 30.0), "0:00:00.9");
        assert_eq!(frame_timestamp(45, 30.0), "0:00:01.4");
    }

    #[test]
    fn first_frame_is_zero() {
        assert_eq!(frame_timestamp(1, 25.0), "0:00:00.0");
        assert_eq!(frame_timestamp(0, 25.0), "0:00:00.0");
    }

    #[test]
    fn exact_boundaries_do_not_round_down() {
        assert_eq!(frame_timestamp(4, 30.0), "0:00:00.1");
        assert_eq!(frame_timestamp(31, 30.0), "0:00:01.0");
        // 2400 frames at 24000/1001 fps is exactly 100.1 s.
        assert_eq!(frame_timestamp(2401, 24000.0 / 1001.0), "0:01:40.1");
    }

    #[test]
    fn ntsc_rates_match_exact_rational_arithmetic() {
        for (num, den) in [(24_000u64, 1_001u64), (30_000, 1_001), (60_000, 1_001), (25, 1)] {
            let fps = num as f64 / den as f64;
            for index in 1..200_000u64 {
                let exact = (index - 1) * 10 * den / num;
                assert_eq!(frame_tenths(index, fps), exact, "index {index} at {num}/{den}");
            }
        }
    }

    #[test]
    fn rolls_minutes_and_hours() {
        assert_eq!(format_tenths(599), "0:00:59.9");
        assert_eq!(format_tenths(600), "0:01:00.0");
        assert_eq!(format_tenths(36_000), "1:00:00.0");
        assert_eq!(format_tenths(90_000 * 10 + 5), "25:00:00.5");
    }

    #[test]
    fn monotonic_for_constant_fps() {
        let mut last = 0;
        for index in 1..2_000 {
            let tenths = frame_tenths(index, 29.97);
            assert!(tenths >= last);
            last = tenths;
        }
    }
}
