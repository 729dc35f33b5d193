//! Duration strings used in `servicegrid.toml`.

use std::time::Duration;

/// Parse a duration string.
///
/// Accepted forms:
/// - unit suffixes, optionally chained: `500ms`, `5s`, `2m`, `9h`, `9h30m`
/// - clock form `H:MM` or `H:MM:SS` (`9:30` is nine and a half hours)
/// - a bare number, taken as seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.contains(':') {
        return parse_clock(s);
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit())?;
        if digits == 0 {
            return None;
        }
        let value: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let step = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60)?),
            "h" => Duration::from_secs(value.checked_mul(3600)?),
            _ => return None,
        };
        total = total.checked_add(step)?;
    }
    Some(total)
}

fn parse_clock(s: &str) -> Option<Duration> {
    let parts: Vec<u64> = s
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<_>>()?;
    let (h, m, sec) = match parts.as_slice() {
        [h, m] if *m < 60 => (*h, *m, 0),
        [h, m, sec] if *m < 60 && *sec < 60 => (*h, *m, *sec),
        _ => return None,
    };
    let secs = h.checked_mul(3600)?.checked_add(m * 60 + sec)?;
    Some(Duration::from_secs(secs))
}
