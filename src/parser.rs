//! Classification of raw probe output lines.
//!
//! The probe tool prints one line per probe. Replies carry both a sequence
//! marker and a timing marker:
//!
//! ```text
//! 64 bytes from 1.1.1.1: icmp_seq=7 ttl=57 time=10.4 ms
//! ```
//!
//! Failures carry only the sequence marker:
//!
//! ```text
//! From 192.168.1.20 icmp_seq=8 Destination Host Unreachable
//! Request timeout for icmp_seq 9
//! ```
//!
//! Everything else (banners, statistics, duplicate replies) is ignored.

/// One classified line of probe output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeLine {
    /// The target answered probe `seq` after `rtt` milliseconds.
    Reply { seq: u64, rtt: f64 },
    /// Probe `seq` went unanswered.
    Unreachable { seq: u64 },
    /// Not a per-probe line.
    NotAProbeLine,
}

impl ProbeLine {
    /// Tool-local sequence number, if this line describes a probe.
    pub fn seq(&self) -> Option<u64> {
        match self {
            ProbeLine::Reply { seq, .. } | ProbeLine::Unreachable { seq } => Some(*seq),
            ProbeLine::NotAProbeLine => None,
        }
    }
}

const SEQ_MARKERS: &[&str] = &["icmp_seq=", "icmp_seq "];
const TIME_MARKERS: &[&str] = &["time=", "time<"];

/// Classify one line. Never fails; unrecognized input is `NotAProbeLine`.
pub fn parse_line(line: &str) -> ProbeLine {
    let line = line.trim();

    // Duplicate replies repeat a sequence number already accounted for, and
    // a redirect notice is followed by the reply for the same probe
    if line.contains("DUP!") || line.contains("Redirect") {
        return ProbeLine::NotAProbeLine;
    }

    let Some((seq, rest)) = find_number(line, SEQ_MARKERS) else {
        return ProbeLine::NotAProbeLine;
    };
    let Ok(seq) = seq.parse::<u64>() else {
        return ProbeLine::NotAProbeLine;
    };

    match find_number(rest, TIME_MARKERS) {
        Some((rtt, _)) => match rtt.parse::<f64>() {
            Ok(rtt) if rtt.is_finite() && rtt >= 0.0 => ProbeLine::Reply { seq, rtt },
            _ => ProbeLine::NotAProbeLine,
        },
        None if has_marker(rest, TIME_MARKERS) => ProbeLine::NotAProbeLine,
        None => ProbeLine::Unreachable { seq },
    }
}

/// Find the first marker and return the numeric run after it plus the
/// remainder of the line.
fn find_number<'a>(haystack: &'a str, markers: &[&str]) -> Option<(&'a str, &'a str)> {
    let after = markers
        .iter()
        .filter_map(|m| haystack.find(m).map(|idx| idx + m.len()))
        .min()?;

    let tail = &haystack[after..];
    let end = tail
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(tail.len());
    if end == 0 {
        return None;
    }
    Some((&tail[..end], &tail[end..]))
}

fn has_marker(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| haystack.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linux_reply() {
        let line = "64 bytes from 1.1.1.1: icmp_seq=7 ttl=57 time=10.4 ms";
        assert_eq!(parse_line(line), ProbeLine::Reply { seq: 7, rtt: 10.4 });
    }

    #[test]
    fn parses_integer_time() {
        let line = "64 bytes from 192.168.1.1: icmp_seq=12 ttl=64 time=3 ms";
        assert_eq!(parse_line(line), ProbeLine::Reply { seq: 12, rtt: 3.0 });
    }

    #[test]
    fn parses_sub_millisecond_marker() {
        let line = "Reply from 10.0.0.1: bytes=32 icmp_seq=4 time<1ms TTL=128";
        assert_eq!(parse_line(line), ProbeLine::Reply { seq: 4, rtt: 1.0 });
    }

    #[test]
    fn parses_unreachable() {
        let line = "From 192.168.1.20 icmp_seq=8 Destination Host Unreachable";
        assert_eq!(parse_line(line), ProbeLine::Unreachable { seq: 8 });
    }

    #[test]
    fn parses_bsd_timeout() {
        let line = "Request timeout for icmp_seq 9";
        assert_eq!(parse_line(line), ProbeLine::Unreachable { seq: 9 });
    }

    #[test]
    fn ignores_banner_and_statistics() {
        assert_eq!(
            parse_line("PING 1.1.1.1 (1.1.1.1) 56(84) bytes of data."),
            ProbeLine::NotAProbeLine
        );
        assert_eq!(
            parse_line("4 packets transmitted, 3 received, 25% packet loss, time 3004ms"),
            ProbeLine::NotAProbeLine
        );
        assert_eq!(parse_line(""), ProbeLine::NotAProbeLine);
    }

    #[test]
    fn ignores_duplicate_replies() {
        let line = "64 bytes from 1.1.1.1: icmp_seq=3 ttl=57 time=11.0 ms (DUP!)";
        assert_eq!(parse_line(line), ProbeLine::NotAProbeLine);
    }

    #[test]
    fn ignores_redirect_notices() {
        let line = "From 192.168.1.1 icmp_seq=1000 Redirect Host(New nexthop: 192.168.1.254)";
        assert_eq!(parse_line(line), ProbeLine::NotAProbeLine);
    }

    #[test]
    fn malformed_numbers_are_not_probe_lines() {
        assert_eq!(parse_line("icmp_seq=abc time=1.0"), ProbeLine::NotAProbeLine);
        assert_eq!(
            parse_line("icmp_seq=99999999999999999999999 time=1.0"),
            ProbeLine::NotAProbeLine
        );
        assert_eq!(parse_line("icmp_seq=3 time=1.2.3 ms"), ProbeLine::NotAProbeLine);
        assert_eq!(parse_line("icmp_seq=3 time=-4 ms"), ProbeLine::NotAProbeLine);
    }

    #[test]
    fn seq_accessor() {
        assert_eq!(ProbeLine::Unreachable { seq: 2 }.seq(), Some(2));
        assert_eq!(ProbeLine::NotAProbeLine.seq(), None);
    }
}
