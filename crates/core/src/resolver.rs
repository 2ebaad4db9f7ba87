//! Deterministic half of the event resolver: candidate disambiguation rules
//! that do not need a model call, free-text date/time fragment scanning, and
//! wall-clock recomposition for reschedules.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// One of the user's upcoming externally-linked events, offered to the
/// resolver as a disambiguation candidate. The list is ordered by start
/// instant and capped by the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventCandidate {
    pub external_ref: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub all_day: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confidence {
    High,
    Low,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub matched_ref: Option<String>,
    pub new_date: Option<NaiveDate>,
    pub new_time: Option<NaiveTime>,
    pub confidence: Confidence,
}

impl Resolution {
    pub fn none() -> Self {
        Self { matched_ref: None, new_date: None, new_time: None, confidence: Confidence::None }
    }

    pub fn is_actionable(&self) -> bool {
        self.confidence == Confidence::High && self.matched_ref.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeterministicMatch {
    Matched(usize),
    Inconclusive,
}

const PRONOUN_WORDS: &[&str] = &["esse", "essa", "este", "esta", "isso", "ele", "ela", "it", "that"];

const PRONOUN_PHRASES: &[&str] =
    &["o compromisso", "a reunião", "a reuniao", "o evento", "the appointment", "the meeting"];

const ORDINALS: &[(&str, usize)] = &[
    ("primeiro", 0),
    ("primeira", 0),
    ("first", 0),
    ("segundo", 1),
    ("segunda", 1),
    ("second", 1),
    ("terceiro", 2),
    ("terceira", 2),
    ("third", 2),
    ("quarto", 3),
    ("quarta", 3),
    ("fourth", 3),
];

const STOPWORDS: &[&str] = &[
    "com", "para", "das", "dos", "the", "and", "que", "uma", "por", "del", "nas", "nos", "aos",
    "meu", "minha", "cancela", "cancelar", "remarca", "remarcar", "muda", "mudar", "adia",
    "adiar", "desmarca", "desmarcar", "apaga", "apagar", "reagenda", "reagendar", "cancel",
    "reschedule", "move", "delete", "dia", "hora", "evento", "compromisso", "reunião", "reuniao",
];

/// Applies the rules that settle a reference without a model:
/// a single candidate plus a pronoun/definite reference, an ordinal, or a
/// uniquely best title-content overlap. Anything else is inconclusive and
/// goes to the model-backed service.
pub fn deterministic_match(text: &str, candidates: &[EventCandidate]) -> DeterministicMatch {
    if candidates.is_empty() {
        return DeterministicMatch::Inconclusive;
    }

    let normalized = text.to_lowercase();
    let words: Vec<&str> =
        normalized.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();

    if candidates.len() == 1 {
        let pronoun = words.iter().any(|w| PRONOUN_WORDS.contains(w))
            || PRONOUN_PHRASES.iter().any(|p| normalized.contains(p));
        if pronoun {
            return DeterministicMatch::Matched(0);
        }
    }

    for (word, index) in ORDINALS {
        if words.contains(word) && *index < candidates.len() {
            return DeterministicMatch::Matched(*index);
        }
    }
    if (words.contains(&"último") || words.contains(&"ultimo") || words.contains(&"last"))
        && !candidates.is_empty()
    {
        return DeterministicMatch::Matched(candidates.len() - 1);
    }

    content_match(&words, candidates)
}

fn content_match(words: &[&str], candidates: &[EventCandidate]) -> DeterministicMatch {
    let tokens: Vec<&str> =
        words.iter().filter(|w| w.len() >= 3 && !STOPWORDS.contains(w)).copied().collect();
    if tokens.is_empty() {
        return DeterministicMatch::Inconclusive;
    }

    let mut best: Option<(usize, usize)> = None;
    let mut tied = false;
    for (index, candidate) in candidates.iter().enumerate() {
        let title = candidate.title.to_lowercase();
        let title_words: Vec<&str> =
            title.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() >= 3).collect();
        let score = tokens.iter().filter(|t| title_words.contains(t)).count();

        match best {
            Some((_, best_score)) if score > best_score => {
                best = Some((index, score));
                tied = false;
            }
            Some((_, best_score)) if score == best_score && score > 0 => tied = true,
            None if score > 0 => best = Some((index, score)),
            _ => {}
        }
    }

    match best {
        Some((index, _)) if !tied => DeterministicMatch::Matched(index),
        _ => DeterministicMatch::Inconclusive,
    }
}

/// Scans free text for `dd/mm[/yyyy]` dates, `hoje`/`amanhã`, and
/// `14h`/`14h30`/`14:30` times. A day/month without a year resolves to the
/// next occurrence of that date on or after `today`.
pub fn parse_fragments(text: &str, today: NaiveDate) -> (Option<NaiveDate>, Option<NaiveTime>) {
    let normalized = text.to_lowercase();
    let mut date = None;
    let mut time = None;

    if normalized.contains("amanhã") || normalized.contains("amanha") {
        date = today.succ_opt();
    } else if normalized.contains("hoje") {
        date = Some(today);
    }

    for token in normalized.split(|c: char| c.is_whitespace() || c == ',') {
        let token = token.trim_matches(|c: char| !c.is_ascii_digit() && c != '/' && c != ':' && c != 'h');
        if date.is_none() {
            date = parse_date_token(token, today);
        }
        if time.is_none() {
            time = parse_time_token(token);
        }
    }

    (date, time)
}

fn parse_date_token(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = token.split('/').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return None;
    }

    let day: u32 = parts[0].parse().ok().filter(|d| (1..=31).contains(d))?;
    let month: u32 = parts[1].parse().ok().filter(|m| (1..=12).contains(m))?;

    if parts.len() == 3 {
        let year: i32 = parts[2].parse().ok()?;
        let year = if year < 100 { 2000 + year } else { year };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year >= today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    }
}

fn parse_time_token(token: &str) -> Option<NaiveTime> {
    let (hour_part, minute_part) = if let Some((h, m)) = token.split_once(':') {
        (h, Some(m))
    } else if let Some((h, m)) = token.split_once('h') {
        (h, (!m.is_empty()).then_some(m))
    } else {
        return None;
    };

    let hour: u32 = hour_part.parse().ok().filter(|h| *h < 24)?;
    let minute: u32 = match minute_part {
        Some(m) => m.parse().ok().filter(|m| *m < 60)?,
        None => 0,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Rebuilds an absolute instant from the event's existing wall-clock
/// components in the user's timezone, overwriting only the components the
/// resolver supplied. A reschedule that names a new date but no time keeps
/// the original time-of-day; the whole timestamp is never blindly replaced.
pub fn recompose_instant(
    current: DateTime<Utc>,
    tz: Tz,
    new_date: Option<NaiveDate>,
    new_time: Option<NaiveTime>,
) -> Option<DateTime<Utc>> {
    if new_date.is_none() && new_time.is_none() {
        return None;
    }

    let local = current.with_timezone(&tz);
    let date = new_date.unwrap_or_else(|| local.date_naive());
    let time = new_time.unwrap_or_else(|| local.time());

    match tz.from_local_datetime(&NaiveDateTime::new(date, time)) {
        chrono::LocalResult::Single(instant) => Some(instant.with_timezone(&Utc)),
        // DST fold: take the earlier reading rather than dropping the event.
        chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        chrono::LocalResult::None => None,
    }
}

/// UTC bounds `[start, end)` of the local calendar day in `tz`. An instant
/// falls inside exactly when its wall-clock date in `tz` is `day`.
pub fn local_day_bounds(day: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    (local_midnight(day, tz), local_midnight(day + Duration::days(1), tz))
}

fn local_midnight(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = NaiveDateTime::new(day, NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        chrono::LocalResult::Single(instant) => instant.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Spring-forward gap at midnight: the day starts when the clocks land.
        chrono::LocalResult::None => tz
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .map(|instant| instant.with_timezone(&Utc))
            .unwrap_or_else(|| midnight.and_utc()),
    }
}
