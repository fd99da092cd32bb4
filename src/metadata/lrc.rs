//! LRC caption parsing.
//!
//! Accepts the common `[mm:ss.xx]text` form, `[h:mm:ss.xxx]text`, and
//! several leading tags on one line (`[00:10.00][01:10.00]chorus`). ID tags
//! such as `[ar:Artist]`, lines without a timestamp and blank lyrics are
//! skipped.

use std::time::Duration;

use crate::model::CaptionLine;

/// Parse LRC text into caption lines ordered by offset.
pub fn parse(contents: &str) -> Vec<CaptionLine> {
    let mut lines = Vec::new();

    for raw in contents.lines() {
        let mut rest = raw.trim_start_matches('\u{feff}');
        let mut offsets = Vec::new();

        while let Some(stripped) = rest.strip_prefix('[') {
            let Some(end) = stripped.find(']') else {
                break;
            };
            match parse_timestamp(&stripped[..end]) {
                Some(offset) => offsets.push(offset),
                None => break,
            }
            rest = &stripped[end + 1..];
        }

        if offsets.is_empty() || rest.trim().is_empty() {
            continue;
        }

        let text = rest.trim_end_matches('\r').to_string();
        for offset in offsets {
            lines.push(CaptionLine {
                offset,
                text: text.clone(),
            });
        }
    }

    // Stable, so lines sharing a timestamp keep file order
    lines.sort_by_key(|line| line.offset);
    lines
}

/// Parse `mm:ss`, `mm:ss.xx` or `h:mm:ss.xxx` into a duration.
fn parse_timestamp(ts: &str) -> Option<Duration> {
    let parts: Vec<&str> = ts.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }

    let (whole_secs, fraction) = match parts[parts.len() - 1].split_once('.') {
        Some((s, f)) => (s, Some(f)),
        None => (parts[parts.len() - 1], None),
    };

    let seconds: u64 = whole_secs.trim().parse().ok()?;
    let minutes: u64 = parts[parts.len() - 2].trim().parse().ok()?;
    let hours: u64 = if parts.len() == 3 {
        parts[0].trim().parse().ok()?
    } else {
        0
    };

    let millis = match fraction {
        Some(f) if !f.is_empty() && f.len() <= 3 && f.chars().all(|c| c.is_ascii_digit()) => {
            // ".4" is 400ms, ".45" is 450ms, ".456" is 456ms
            let padded = format!("{:0<3}", f);
            padded.parse::<u64>().ok()?
        }
        Some(_) => return None,
        None => 0,
    };

    // Corrupt stamps can be arbitrarily large
    let total_secs = hours
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60)?
        .checked_add(seconds)?;
    Some(Duration::from_millis(
        total_secs.checked_mul(1000)?.checked_add(millis)?,
    ))
}
