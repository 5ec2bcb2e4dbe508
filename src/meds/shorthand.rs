//! Prescription shorthand, e.g. `"metformin 500mg PO qHS"`.
//!
//! Grammar: `<name>... <dosage><unit> [<route>] <freq> [prn | ad lib] [sched(<policy>)]`.
//! [`parse`] and [`format`] are structural inverses:
//! `parse(name + " " + format(d).1) == d` apart from the cached shorthand field.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{MedError, MedResult};
use super::types::{Direction, DirectionFlag, OptSchedule};

static OPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z]+)\((\w*)\)$").expect("valid option regex"));
static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("valid digits regex"));
static LETTERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]+$").expect("valid letters regex"));
static FREQ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)([a-z]+)$").expect("valid frequency regex"));
static DOSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)([a-zA-Z]*)$").expect("valid dosage regex"));

/// Parse a shorthand directive into a [`Direction`] with its cached shorthand filled in.
pub fn parse(shorthand: &str) -> MedResult<Direction> {
    let mut words: Vec<String> = shorthand.split_whitespace().map(str::to_string).collect();
    if words.is_empty() {
        return Err(MedError::parse(shorthand, "empty shorthand"));
    }

    let opt_schedule = strip_options(&mut words)?;
    let mut flags = BTreeSet::new();

    merge_split_dosage(&mut words);
    if strip_ad_lib(&mut words) {
        flags.insert(DirectionFlag::AdLib);
    }

    if let Some(idx) = words.iter().rposition(|w| w.eq_ignore_ascii_case("prn")) {
        if flags.contains(&DirectionFlag::AdLib) {
            return Err(MedError::validation("cannot use 'ad lib' and 'prn' together"));
        }
        flags.insert(DirectionFlag::Prn);
        words.remove(idx);
    }

    let (period_hours, freq_flag, freq_idx) = parse_frequency(&words)?;
    if let Some(flag) = freq_flag {
        flags.insert(flag);
    }
    words.truncate(freq_idx);

    let (dosage, dosage_unit, dosage_route) = parse_dosage(&mut words)?;

    let name = words.join(" ");
    if name.is_empty() {
        return Err(MedError::validation("name cannot be empty"));
    }

    let mut direction = Direction {
        name,
        period_hours,
        dosage,
        dosage_unit,
        dosage_route,
        flags,
        direction_shorthand: String::new(),
        opt_schedule,
    };
    direction.validate()?;
    direction.direction_shorthand = full_shorthand(&direction);
    Ok(direction)
}

/// Render `(name, body)` for a direction.
pub fn format(direction: &Direction) -> (String, String) {
    let mut body = format!("{}{}", direction.dosage, direction.dosage_unit);
    if !direction.dosage_route.is_empty() {
        body.push(' ');
        body.push_str(&direction.dosage_route);
    }

    body.push(' ');
    body.push_str(&frequency_word(direction));

    if direction.has_flag(DirectionFlag::Prn) {
        body.push_str(" PRN");
    } else if direction.has_flag(DirectionFlag::AdLib) {
        body.push_str(" ad lib");
    }
    if direction.opt_schedule == OptSchedule::WholeDose {
        body.push_str(" sched(whole)");
    }

    (direction.name.clone(), body)
}

/// `name + " " + body`, the value cached as `Direction::direction_shorthand`.
pub fn full_shorthand(direction: &Direction) -> String {
    let (name, body) = format(direction);
    format!("{name} {body}")
}

fn frequency_word(direction: &Direction) -> String {
    let hours = direction.period_hours;
    if hours % 24 == 0 {
        let days = hours / 24;
        if days == 1 {
            if direction.has_flag(DirectionFlag::Am) {
                "qAM".into()
            } else if direction.has_flag(DirectionFlag::Hs) {
                "qHS".into()
            } else {
                "qd".into()
            }
        } else {
            format!("q{days}d")
        }
    } else {
        match hours {
            12 => "bid".into(),
            8 => "tid".into(),
            6 => "qid".into(),
            _ => format!("q{hours}h"),
        }
    }
}

/// Strip trailing `name(value)` options right to left.
fn strip_options(words: &mut Vec<String>) -> MedResult<OptSchedule> {
    let mut schedule = None;
    while let Some(last) = words.last() {
        let Some(caps) = OPTION_RE.captures(last) else {
            break;
        };
        let name = caps[1].to_lowercase();
        let value = caps[2].to_lowercase();
        match name.as_str() {
            "sched" | "schedule" => {
                if schedule.is_some() {
                    return Err(MedError::validation("duplicate schedule option"));
                }
                schedule = Some(match value.as_str() {
                    "" | "default" => OptSchedule::Default,
                    "whole" => OptSchedule::WholeDose,
                    _ => return Err(MedError::parse(last.as_str(), "invalid schedule option")),
                });
            }
            _ => return Err(MedError::parse(last.as_str(), "unknown option")),
        }
        words.pop();
    }
    Ok(schedule.unwrap_or_default())
}

/// `"500 mg"` becomes `"500mg"`.
fn merge_split_dosage(words: &mut Vec<String>) {
    let mut i = 0;
    while i + 1 < words.len() {
        if DIGITS_RE.is_match(&words[i]) && LETTERS_RE.is_match(&words[i + 1]) && !is_reserved(&words[i + 1]) {
            let unit = words.remove(i + 1);
            words[i].push_str(&unit);
        }
        i += 1;
    }
}

/// Words that must never be glued onto a bare number.
fn is_reserved(word: &str) -> bool {
    let lower = word.to_lowercase();
    matches!(lower.as_str(), "bid" | "tid" | "qid" | "prn" | "ad" | "adlib")
        || lower.starts_with('q')
}

/// Remove `ad lib` / `adlib`, returning whether it was present.
fn strip_ad_lib(words: &mut Vec<String>) -> bool {
    let mut found = false;
    let mut i = 0;
    while i < words.len() {
        if words[i].eq_ignore_ascii_case("adlib") {
            words.remove(i);
            found = true;
        } else if words[i].eq_ignore_ascii_case("ad")
            && words.get(i + 1).is_some_and(|w| w.eq_ignore_ascii_case("lib"))
        {
            words.drain(i..i + 2);
            found = true;
        } else {
            i += 1;
        }
    }
    found
}

/// Returns `(period_hours, implied flag, index where the frequency starts)`.
fn parse_frequency(words: &[String]) -> MedResult<(i64, Option<DirectionFlag>, usize)> {
    let Some(last) = words.last() else {
        return Err(MedError::parse("", "missing frequency"));
    };
    let last_idx = words.len() - 1;
    match last.to_lowercase().as_str() {
        "bid" => return Ok((12, None, last_idx)),
        "tid" => return Ok((8, None, last_idx)),
        "qid" => return Ok((6, None, last_idx)),
        _ => {}
    }

    let freq_idx = words
        .iter()
        .rposition(|w| w.to_lowercase().starts_with('q'))
        .ok_or_else(|| MedError::parse(last.as_str(), "invalid frequency"))?;
    let token = words[freq_idx..].join("");
    let freq = token.to_lowercase()[1..].to_string();

    match freq.as_str() {
        "am" => return Ok((24, Some(DirectionFlag::Am), freq_idx)),
        "hs" => return Ok((24, Some(DirectionFlag::Hs), freq_idx)),
        _ => {}
    }

    let freq = if freq.starts_with(|c: char| c.is_ascii_digit()) {
        freq
    } else {
        format!("1{freq}")
    };
    let caps = FREQ_RE
        .captures(&freq)
        .ok_or_else(|| MedError::parse(token.as_str(), "invalid frequency"))?;
    let count: i64 = caps[1]
        .parse()
        .map_err(|_| MedError::parse(token.as_str(), "invalid frequency number"))?;
    let hours = match &caps[2] {
        "d" => count
            .checked_mul(24)
            .ok_or_else(|| MedError::parse(token.as_str(), "frequency too large"))?,
        "h" => count,
        _ => return Err(MedError::parse(token.as_str(), "invalid frequency unit")),
    };
    if hours <= 0 {
        return Err(MedError::validation("period must be positive"));
    }
    Ok((hours, None, freq_idx))
}

/// Pops the dosage (and optional route) off the end of `words`.
fn parse_dosage(words: &mut Vec<String>) -> MedResult<(i64, String, String)> {
    let n = words.len();
    if n == 0 {
        return Err(MedError::parse("", "missing dosage"));
    }

    let (caps_word, route) = if DOSAGE_RE.is_match(&words[n - 1]) {
        (words[n - 1].clone(), String::new())
    } else if n >= 2 && DOSAGE_RE.is_match(&words[n - 2]) {
        (words[n - 2].clone(), words[n - 1].clone())
    } else {
        let start = n.saturating_sub(2);
        return Err(MedError::parse(words[start..].join(" "), "invalid dosage"));
    };

    let caps = DOSAGE_RE
        .captures(&caps_word)
        .ok_or_else(|| MedError::parse(caps_word.as_str(), "invalid dosage"))?;
    let dosage: i64 = caps[1]
        .parse()
        .map_err(|_| MedError::parse(caps_word.as_str(), "invalid dosage number"))?;
    if dosage <= 0 {
        return Err(MedError::validation("dosage must be positive"));
    }
    let unit = caps[2].to_string();

    words.truncate(if route.is_empty() { n - 1 } else { n - 2 });
    Ok((dosage, unit, route))
}
