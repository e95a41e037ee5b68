use chrono::{DateTime, Datelike, Duration, Local, Months, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

const MONTH_PATTERN: &str = r"(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)";

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("iso date regex"));
static YMD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[/-](\d{1,2})[/-](\d{1,2})$").expect("ymd regex"));
static MDY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4})$").expect("mdy regex"));
static MONTH_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b{MONTH_PATTERN}\s+(\d{{1,2}})(?:st|nd|rd|th)?(?:,\s*(\d{{4}}))?\b"
    ))
    .expect("month name regex")
});

static ISO_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("iso token regex"));
static YMD_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4}[/-]\d{1,2}[/-]\d{1,2})\b").expect("ymd token regex"));
static MDY_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}[/-]\d{1,2}[/-]\d{4})\b").expect("mdy token regex"));

const FALLBACK_DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const FALLBACK_DATE_FORMATS: [&str; 7] = [
    "%A, %B %d, %Y",
    "%a, %b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%Y.%m.%d",
];

pub fn is_iso_date_only(text: &str) -> bool {
    ISO_DATE_RE.is_match(text)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn normalize_date(text: &str) -> Option<String> {
    normalize_date_on(text, today())
}

pub fn normalize_date_on(text: &str, today: NaiveDate) -> Option<String> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    if is_iso_date_only(s) {
        return Some(s.to_string());
    }

    // Numeric forms are reformatted as-is, without calendar validation.
    if let Some(caps) = YMD_RE.captures(s) {
        return Some(pad_ymd(&caps[1], &caps[2], &caps[3]));
    }
    if let Some(caps) = MDY_RE.captures(s) {
        return Some(pad_ymd(&caps[3], &caps[1], &caps[2]));
    }

    if let Some(date) = resolve_month_name(s, today) {
        return Some(format_date(date));
    }

    fallback_parse(s).map(format_date)
}

pub fn extract_first_date_candidate(text: &str) -> Option<String> {
    let s = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.is_empty() {
        return None;
    }
    for re in [&*ISO_TOKEN_RE, &*YMD_TOKEN_RE, &*MDY_TOKEN_RE] {
        if let Some(caps) = re.captures(&s) {
            return Some(caps[1].to_string());
        }
    }
    MONTH_NAME_RE.find(&s).map(|m| m.as_str().to_string())
}

/// Inclusive `[today, today + months]` as ISO date strings.
pub fn forward_window(today: NaiveDate, months: u32) -> (String, String) {
    let end = today
        .checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX);
    (format_date(today), format_date(end))
}

fn pad_ymd(year: &str, month: &str, day: &str) -> String {
    let month = month.parse::<u32>().unwrap_or(0);
    let day = day.parse::<u32>().unwrap_or(0);
    format!("{year}-{month:02}-{day:02}")
}

fn resolve_month_name(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let caps = MONTH_NAME_RE.captures(text)?;
    let month = month_number(&caps[1])?;
    let day = caps[2].parse::<u32>().ok()?;

    if let Some(year) = caps.get(3) {
        return lenient_date(year.as_str().parse().ok()?, month, day);
    }

    // Listings without a year that name today's date are read as next year's occurrence.
    let this_year = lenient_date(today.year(), month, day)?;
    if this_year <= today {
        return lenient_date(today.year() + 1, month, day);
    }
    Some(this_year)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Days past the end of the month roll into the next one ("February 30" is March 2).
fn lenient_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(1..=31).contains(&day) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1)?.checked_add_signed(Duration::days(i64::from(day) - 1))
}

fn fallback_parse(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for fmt in FALLBACK_DATETIME_FORMATS.iter() {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in FALLBACK_DATE_FORMATS.iter() {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    None
}
