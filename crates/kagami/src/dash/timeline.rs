//! Segment enumeration of `SegmentTemplate` addressing.
//!
//! References:
//! - [DASH-IF implementation guidelines: restricted timing model](https://dashif.org/Guidelines-TimingModel)
//! - https://github.com/emarsden/dash-mpd-rs/blob/main/src/fetch.rs

/// Upper bound of segments enumerated for one representation.
pub(crate) const MAX_SEGMENTS: u64 = 1_000_000;

/// Number and start time of one segment, the values `$Number$` and `$Time$` expand to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPosition {
    pub number: u64,
    pub time: u64,
}

/// One `S` element of a `SegmentTimeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineSegment {
    pub time: Option<u64>,
    pub duration: u64,
    /// `S@r`. A negative value repeats until the next `S@t`, or the end of the period.
    pub repeat_count: i64,
}

/// Explicit addressing, aka `SegmentTemplate` with `SegmentTimeline`.
///
/// `end_time` is the end of the period in timescale units, used by `S@r="-1"`
/// on the last `S` element.
pub fn timeline_positions(
    segments: &[TimelineSegment],
    start_number: u64,
    end_time: Option<u64>,
) -> Result<Vec<SegmentPosition>, String> {
    let mut positions = Vec::new();
    // `None` once the numbers are exhausted
    let mut number = Some(start_number);
    let mut current_time = 0u64;

    for (index, segment) in segments.iter().enumerate() {
        if let Some(time) = segment.time {
            current_time = time;
        }
        if segment.duration == 0 {
            return Err("S@d must be positive".to_string());
        }

        let count = if segment.repeat_count >= 0 {
            segment.repeat_count as u64 + 1
        } else {
            let until = segments
                .get(index + 1)
                .and_then(|next| next.time)
                .or(end_time);
            match until {
                Some(until) => until.saturating_sub(current_time).div_ceil(segment.duration),
                None => {
                    log::warn!("S@r=-1 without a known period end, repeating once");
                    1
                }
            }
        };

        if positions.len() as u64 + count > MAX_SEGMENTS {
            return Err(format!("more than {MAX_SEGMENTS} segments"));
        }
        for _ in 0..count {
            let current = number.ok_or_else(number_overflow)?;
            positions.push(SegmentPosition {
                number: current,
                time: current_time,
            });
            number = current.checked_add(1);
            current_time = current_time.saturating_add(segment.duration);
        }
    }

    Ok(positions)
}

/// Simple addressing, aka `SegmentTemplate` without `SegmentTimeline`.
///
/// The segment count comes from `@endNumber`, otherwise from the period duration
/// (in seconds) divided by the nominal segment duration.
pub fn numbered_positions(
    start_number: u64,
    end_number: Option<u64>,
    duration: Option<u64>,
    timescale: u64,
    presentation_time_offset: u64,
    period_duration: Option<f64>,
) -> Result<Vec<SegmentPosition>, String> {
    let duration = duration.filter(|d| *d > 0);
    let count = match end_number {
        Some(end_number) => end_number
            .checked_sub(start_number)
            .map_or(0, |last| last.saturating_add(1)),
        None => {
            let duration = duration.ok_or("neither @endNumber nor @duration is present")?;
            let period_duration = period_duration.ok_or("period duration is unknown")?;
            let count = period_duration * timescale as f64 / duration as f64;
            // 1e-9 absorbs the error of the float division
            (count - 1e-9).ceil().max(0.0) as u64
        }
    };
    if count > MAX_SEGMENTS {
        return Err(format!("more than {MAX_SEGMENTS} segments"));
    }

    let duration = duration.unwrap_or(0);
    (0..count)
        .map(|index| -> Result<SegmentPosition, String> {
            Ok(SegmentPosition {
                number: start_number.checked_add(index).ok_or_else(number_overflow)?,
                time: presentation_time_offset.saturating_add(index.saturating_mul(duration)),
            })
        })
        .collect()
}

fn number_overflow() -> String {
    "segment number overflows".to_string()
}

/// Durations in seconds of consecutive periods, given their declared `@start` and
/// `@duration`.
///
/// A period without `@duration` lasts until the next declared `@start`, the last one
/// until `MPD@mediaPresentationDuration`.
pub(crate) fn period_durations(
    declared: &[(Option<f64>, Option<f64>)],
    presentation_duration: Option<f64>,
) -> Vec<Option<f64>> {
    let mut starts = Vec::with_capacity(declared.len());
    let mut previous_end = Some(0.0);
    for (start, duration) in declared {
        let start = start.or(previous_end);
        starts.push(start);
        previous_end = start.zip(*duration).map(|(s, d)| s + d);
    }

    declared
        .iter()
        .enumerate()
        .map(|(index, (_, duration))| {
            if duration.is_some() {
                return *duration;
            }
            let start = starts[index]?;
            let end = match declared.get(index + 1) {
                Some((next_start, _)) => (*next_start)?,
                None => presentation_duration?,
            };
            Some((end - start).max(0.0))
        })
        .collect()
}

/// Parse an `xs:duration` such as `PT1H2M3.5S` or `P1DT12H` to seconds.
///
/// Years and months are counted as 365 and 30 days. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Option<f64> {
    let rest = input.trim().strip_prefix('P')?;
    let (date, time) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };
    if date.is_empty() && time.map_or(true, str::is_empty) {
        return None;
    }

    let mut seconds = 0.0;
    for (value, unit) in duration_fields(date)? {
        seconds += value
            * match unit {
                'Y' => 365.0 * 86400.0,
                'M' => 30.0 * 86400.0,
                'W' => 7.0 * 86400.0,
                'D' => 86400.0,
                _ => return None,
            };
    }
    if let Some(time) = time {
        if time.is_empty() {
            return None;
        }
        for (value, unit) in duration_fields(time)? {
            seconds += value
                * match unit {
                    'H' => 3600.0,
                    'M' => 60.0,
                    'S' => 1.0,
                    _ => return None,
                };
        }
    }
    Some(seconds)
}

fn duration_fields(input: &str) -> Option<Vec<(f64, char)>> {
    let mut fields = Vec::new();
    let mut start = 0;
    for (pos, c) in input.char_indices() {
        if c.is_ascii_alphabetic() {
            let value: f64 = input[start..pos].parse().ok()?;
            if !value.is_finite() || value < 0.0 {
                return None;
            }
            fields.push((value, c));
            start = pos + 1;
        }
    }
    (start == input.len()).then_some(fields)
}
