//! Encoder progress reporting
//!
//! ffmpeg's `-progress` output is a stream of `key=value` lines, closed into
//! a block by a `progress=continue` or `progress=end` line.

use std::time::{Duration, Instant};

/// State of a running encode at the end of one progress block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub frame: u64,
    pub fps: f64,
    /// Encoded position as HH:MM:SS.micros
    pub out_time: String,
    /// Multiple of real time, absent while ffmpeg reports N/A
    pub speed: Option<f64>,
    pub bitrate: Option<String>,
    pub finished: bool,
}

/// Fold one progress line into `current`
///
/// Returns a copy of the snapshot when the line closes a block.
pub fn parse_progress_line(line: &str, current: &mut ProgressSnapshot) -> Option<ProgressSnapshot> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();

    match key {
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "out_time" => current.out_time = value.to_string(),
        "bitrate" => {
            current.bitrate = (value != "N/A").then(|| value.to_string());
        }
        "speed" => {
            current.speed = value.strip_suffix('x').and_then(|s| s.trim().parse().ok());
        }
        "progress" => {
            current.finished = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// Gate that lets at most one report through per interval
///
/// The first report is let through immediately.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a report made at `now` should be emitted; records it if so
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_block_parsing() {
        let block = "frame=1200\nfps=48.5\nbitrate=2301.4kbits/s\nout_time=00:00:50.050000\nspeed=2.02x\nprogress=continue\n";
        let mut current = ProgressSnapshot::default();

        let snapshots: Vec<ProgressSnapshot> = block
            .lines()
            .filter_map(|line| parse_progress_line(line, &mut current))
            .collect();

        assert_eq!(snapshots.len(), 1);
        let snapshot = &snapshots[0];
        assert_eq!(snapshot.frame, 1200);
        assert!((snapshot.fps - 48.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.out_time, "00:00:50.050000");
        assert_eq!(snapshot.speed, Some(2.02));
        assert_eq!(snapshot.bitrate.as_deref(), Some("2301.4kbits/s"));
        assert!(!snapshot.finished);
    }

    #[test]
    fn test_progress_end_and_unavailable_values() {
        let mut current = ProgressSnapshot::default();
        assert!(parse_progress_line("speed=N/A", &mut current).is_none());
        assert!(parse_progress_line("bitrate=N/A", &mut current).is_none());
        assert!(parse_progress_line("not a progress line", &mut current).is_none());

        let snapshot = parse_progress_line("progress=end", &mut current).unwrap();
        assert!(snapshot.finished);
        assert_eq!(snapshot.speed, None);
        assert_eq!(snapshot.bitrate, None);
    }

    #[test]
    fn test_values_carry_over_between_blocks() {
        let mut current = ProgressSnapshot::default();
        parse_progress_line("frame=10", &mut current);
        parse_progress_line("progress=continue", &mut current);
        parse_progress_line("fps=24", &mut current);

        let second = parse_progress_line("progress=continue", &mut current).unwrap();
        assert_eq!(second.frame, 10);
        assert!((second.fps - 24.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_throttle_allows_one_report_per_interval() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60));

        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_secs(1)));
        assert!(!throttle.ready(start + Duration::from_secs(59)));
        assert!(throttle.ready(start + Duration::from_secs(60)));
        assert!(!throttle.ready(start + Duration::from_secs(90)));
        assert!(throttle.ready(start + Duration::from_secs(121)));
    }

    #[test]
    fn test_zero_interval_never_throttles() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        assert!(throttle.ready(start));
        assert!(throttle.ready(start));
    }
}
