//! Seconds to frame-accurate timecodes.
//!
//! Every conversion goes through a whole frame count computed by truncation,
//! so `HH:MM:SS:FF` fields are never rounded independently.

/// Default output frame rate.
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Guards `floor` against values like `0.7 * 30 = 20.999999999999996`.
const FRAME_EPSILON: f64 = 1e-6;

/// Whole frames elapsed at `seconds`, truncated.
pub fn seconds_to_frames(seconds: f64, fps: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 || fps == 0 {
        return 0;
    }
    (seconds * f64::from(fps) + FRAME_EPSILON).floor() as u64
}

/// `HH:MM:SS:FF` for a frame count.
pub fn frames_to_timecode(frames: u64, fps: u32) -> String {
    let fps = u64::from(fps.max(1));
    let ff = frames % fps;
    let total_secs = frames / fps;
    format!(
        "{:02}:{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ff
    )
}

/// `HH:MM:SS:FF` for a time in seconds.
pub fn seconds_to_timecode(seconds: f64, fps: u32) -> String {
    frames_to_timecode(seconds_to_frames(seconds, fps), fps)
}

/// Document clock time `HH:MM:SS.mmm`, truncated to the millisecond.
pub fn clock_time(seconds: f64) -> String {
    let millis = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0 + FRAME_EPSILON).floor() as u64
    } else {
        0
    };
    let total_secs = millis / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        millis % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timecode_basic() {
        assert_eq!(seconds_to_timecode(0.0, 30), "00:00:00:00");
        assert_eq!(seconds_to_timecode(1.5, 30), "00:00:01:15");
        assert_eq!(seconds_to_timecode(3661.5, 30), "01:01:01:15");
        assert_eq!(seconds_to_timecode(2.0, 25), "00:00:02:00");
    }

    #[test]
    fn test_truncates_instead_of_rounding() {
        // 1.99s is frame 59.7; it stays in second 1
        assert_eq!(seconds_to_timecode(1.99, 30), "00:00:01:29");
    }

    #[test]
    fn test_epsilon_guards_float_error() {
        assert_eq!(seconds_to_frames(0.7, 30), 21);
        assert_eq!(seconds_to_frames(0.1 + 0.2, 30), 9);
    }

    #[test]
    fn test_invalid_seconds_clamp_to_zero() {
        assert_eq!(seconds_to_frames(-1.0, 30), 0);
        assert_eq!(seconds_to_frames(f64::NAN, 30), 0);
    }

    #[test]
    fn test_clock_time() {
        assert_eq!(clock_time(0.0), "00:00:00.000");
        assert_eq!(clock_time(2.5), "00:00:02.500");
        assert_eq!(clock_time(61.0405), "00:01:01.040");
        assert_eq!(clock_time(3600.0), "01:00:00.000");
    }
}
