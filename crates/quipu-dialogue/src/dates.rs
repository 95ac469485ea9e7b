//! Informal date parsing for due dates and fulfillment dates.
//!
//! WhatsApp users type dates very loosely ("tomorrow 5pm", "next friday",
//! "the 19th", "march 5 at 14:00"). Everything here rolls forward: a phrase
//! that would land in the past is pushed to the next day / week / month /
//! year so nothing is ever scheduled behind the clock.
//!
//! Pure over an injected `now`; [`parse_due_now`] is the wall-clock
//! convenience used by the router.

use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc, Weekday,
};

/// Hour used when a phrase names a date but no time.
const DEFAULT_TIME: (u32, u32) = (9, 0);

/// Parse a due phrase against the current local clock, returning UTC.
pub fn parse_due_now(text: &str) -> Option<DateTime<Utc>> {
    parse_due_phrase(text, Local::now().naive_local()).map(to_utc)
}

/// Interpret a naive local timestamp in the local zone, as UTC.
pub fn to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        // A nonexistent local time (DST gap): take the wall clock as UTC.
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

/// Parse an informal date phrase relative to `now` (naive local time).
pub fn parse_due_phrase(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Machine-ish formats pass through untouched.
    if let Some(dt) = parse_explicit(trimmed) {
        return Some(dt);
    }

    let toks = tokenize(trimmed);
    let (time, time_toks) = extract_time(&toks);
    let today = now.date();
    let default_time = NaiveTime::from_hms_opt(DEFAULT_TIME.0, DEFAULT_TIME.1, 0)?;
    let at = |date: NaiveDate| date.and_time(time.unwrap_or(default_time));
    let has = |w: &str| toks.iter().any(|t| t == w);

    if has("tomorrow") {
        return today.succ_opt().map(at);
    }

    if has("today") || has("tonight") {
        let dt = at(today);
        if dt <= now {
            return today.succ_opt().map(at);
        }
        return Some(dt);
    }

    if has_pair(&toks, "next", "week") {
        return Some(at(today + Duration::days(7)));
    }

    if has_pair(&toks, "next", "month") {
        return today.checked_add_months(Months::new(1)).map(at);
    }

    // Weekday names, with or without a this/next/coming qualifier: the next
    // occurrence on or after today, rolling a week when already past.
    if let Some(wd) = toks.iter().find_map(|t| weekday_from(t)) {
        let ahead = (wd.num_days_from_monday() as i64
            - today.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        let candidate = at(today + Duration::days(ahead));
        if candidate <= now {
            return Some(at(today + Duration::days(ahead + 7)));
        }
        return Some(candidate);
    }

    // Bare day-of-month with an optional month name: "the 19th", "march 5".
    if let Some(dt) = day_of_month(&toks, &time_toks, today, time.unwrap_or(default_time), now) {
        return Some(dt);
    }

    // Time only: today, or tomorrow once the time has passed.
    if time.is_some() {
        let dt = at(today);
        if dt <= now {
            return today.succ_opt().map(at);
        }
        return Some(dt);
    }

    None
}

fn parse_explicit(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    let default_time = NaiveTime::from_hms_opt(DEFAULT_TIME.0, DEFAULT_TIME.1, 0)?;
    for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Some(d.and_time(default_time));
        }
    }
    None
}

/// Lowercase word tokens; ':' survives so clock times stay intact.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != ':')
        .map(|w| w.trim_matches(':'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn digits(tok: &str) -> Option<u32> {
    if tok.is_empty() || !tok.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    tok.parse().ok()
}

fn day_number(tok: &str) -> Option<u32> {
    let stem = ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|s| tok.strip_suffix(s))
        .unwrap_or(tok);
    digits(stem).filter(|&n| (1..=31).contains(&n))
}

/// "5", "5:30" → (hour, minute).
fn parse_clock(tok: &str) -> Option<(u32, u32)> {
    let (h, m) = match tok.split_once(':') {
        Some((h, m)) => (digits(h)?, digits(m)?),
        None => (digits(tok)?, 0),
    };
    (m <= 59).then_some((h, m))
}

fn to_24(hour: u32, meridiem: &str) -> u32 {
    match (hour % 12, meridiem) {
        (h, "pm") => h + 12,
        (h, _) => h,
    }
}

/// Pull a time of day out of the token stream: "5pm", "5:30pm", "5 pm",
/// "17:00". Returns the time plus the indexes of the tokens it consumed so
/// date scanning can skip them.
fn extract_time(toks: &[String]) -> (Option<NaiveTime>, Vec<usize>) {
    // Meridiem forms win over bare 24-hour ones.
    for (i, t) in toks.iter().enumerate() {
        for meridiem in ["am", "pm"] {
            let Some(stem) = t.strip_suffix(meridiem) else {
                continue;
            };
            if stem.is_empty() {
                // "5 pm": the clock sits in the previous token.
                if i == 0 {
                    continue;
                }
                if let Some((h, m)) = parse_clock(&toks[i - 1]) {
                    if (1..=12).contains(&h) {
                        let time = NaiveTime::from_hms_opt(to_24(h, meridiem), m, 0);
                        return (time, vec![i - 1, i]);
                    }
                }
            } else if let Some((h, m)) = parse_clock(stem) {
                if (1..=12).contains(&h) {
                    let time = NaiveTime::from_hms_opt(to_24(h, meridiem), m, 0);
                    return (time, vec![i]);
                }
            }
        }
    }

    // 24-hour "17:00" / "9:30".
    for (i, t) in toks.iter().enumerate() {
        if !t.contains(':') {
            continue;
        }
        if let Some((h, m)) = parse_clock(t) {
            if h <= 23 {
                return (NaiveTime::from_hms_opt(h, m, 0), vec![i]);
            }
        }
    }

    (None, Vec::new())
}

fn has_pair(toks: &[String], a: &str, b: &str) -> bool {
    toks.windows(2).any(|w| w[0] == a && w[1] == b)
}

fn weekday_from(tok: &str) -> Option<Weekday> {
    match tok {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn month_from(tok: &str) -> Option<u32> {
    let months = [
        ("january", "jan", 1),
        ("february", "feb", 2),
        ("march", "mar", 3),
        ("april", "apr", 4),
        ("may", "may", 5),
        ("june", "jun", 6),
        ("july", "jul", 7),
        ("august", "aug", 8),
        ("september", "sep", 9),
        ("october", "oct", 10),
        ("november", "nov", 11),
        ("december", "dec", 12),
    ];
    months
        .iter()
        .find(|(full, abbr, _)| tok == *full || tok == *abbr)
        .map(|(_, _, n)| *n)
}

fn day_of_month(
    toks: &[String],
    time_toks: &[usize],
    today: NaiveDate,
    time: NaiveTime,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let day = toks
        .iter()
        .enumerate()
        .filter(|(i, _)| !time_toks.contains(i))
        .find_map(|(_, t)| day_number(t))?;

    let month = toks.iter().find_map(|t| month_from(t));
    let date = NaiveDate::from_ymd_opt(today.year(), month.unwrap_or(today.month()), day)?;
    let dt = date.and_time(time);
    if dt > now {
        return Some(dt);
    }

    // Already past: with an explicit month roll a year, otherwise a month.
    let rolled = if month.is_some() {
        NaiveDate::from_ymd_opt(today.year() + 1, month.unwrap_or(today.month()), day)?
    } else {
        date.checked_add_months(Months::new(1))?
    };
    Some(rolled.and_time(time))
}
