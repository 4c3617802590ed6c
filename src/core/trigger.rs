//! Trigger expressions and next-fire computation.
//!
//! A trigger is either a cron expression evaluated in a timezone or a fixed
//! interval. Accepted forms:
//!
//! - 5-field cron `minute hour day month weekday` (seconds fixed at 0)
//! - 6/7-field cron with a leading seconds field (and optional year)
//! - shortcuts `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
//!   `@midnight`, `@hourly`
//! - intervals `@every 30s`, `@every 5m`, `@every 1h30m`, `@every 2d`
//!
//! Parsing happens once, at construction, so a malformed expression is
//! reported to whoever registers the job rather than to the trigger loop.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while parsing a trigger expression.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Invalid cron expression.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// Invalid interval expression.
    #[error("invalid interval '{0}'")]
    InvalidInterval(String),

    /// Unknown timezone name.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// A parsed, validated trigger.
#[derive(Clone)]
pub struct Trigger {
    expression: String,
    timezone: Tz,
    kind: TriggerKind,
}

#[derive(Clone)]
enum TriggerKind {
    Cron(Box<cron::Schedule>),
    Interval(Duration),
}

impl Trigger {
    /// Parse an expression evaluated in UTC.
    pub fn parse(expression: &str) -> Result<Self, TriggerError> {
        Self::build(expression, Tz::UTC)
    }

    /// Parse an expression evaluated in the named IANA timezone.
    pub fn with_timezone(expression: &str, timezone: &str) -> Result<Self, TriggerError> {
        let tz = timezone
            .parse::<Tz>()
            .map_err(|_| TriggerError::InvalidTimezone(timezone.to_string()))?;
        Self::build(expression, tz)
    }

    /// Fixed-interval trigger.
    pub fn every(interval: Duration) -> Result<Self, TriggerError> {
        if interval.is_zero() {
            return Err(TriggerError::InvalidInterval("0s".to_string()));
        }
        let expression = if interval.subsec_millis() == 0 {
            format!("@every {}s", interval.as_secs())
        } else {
            format!("@every {}ms", interval.as_millis())
        };
        Ok(Self {
            expression,
            timezone: Tz::UTC,
            kind: TriggerKind::Interval(interval),
        })
    }

    fn build(expression: &str, timezone: Tz) -> Result<Self, TriggerError> {
        let trimmed = expression.trim();
        let kind = match trimmed.strip_prefix('@') {
            Some(shortcut) => parse_shortcut(trimmed, shortcut)?,
            None => parse_cron(trimmed)?,
        };
        Ok(Self {
            expression: trimmed.to_string(),
            timezone,
            kind,
        })
    }

    /// The expression as written at registration.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Timezone cron fields are evaluated in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Interval length, for interval triggers.
    pub fn interval(&self) -> Option<Duration> {
        match &self.kind {
            TriggerKind::Interval(d) => Some(*d),
            TriggerKind::Cron(_) => None,
        }
    }

    /// First fire time strictly after `after`, or `None` when the expression
    /// has no further occurrences.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.kind {
            TriggerKind::Cron(schedule) => schedule
                .after(&after.with_timezone(&self.timezone))
                .next()
                .map(|dt| dt.with_timezone(&Utc)),
            TriggerKind::Interval(d) => {
                let step = chrono::Duration::from_std(*d).ok()?;
                after.checked_add_signed(step)
            }
        }
    }

    /// Number of fire times in `(from, to]`, capped at `cap`.
    pub fn occurrences_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cap: usize,
    ) -> usize {
        let mut count = 0;
        let mut cursor = from;
        while count < cap {
            match self.next_after(cursor) {
                Some(next) if next <= to => {
                    count += 1;
                    cursor = next;
                }
                _ => break,
            }
        }
        count
    }
}

impl FromStr for Trigger {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("expression", &self.expression)
            .field("timezone", &self.timezone.name())
            .finish()
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timezone == Tz::UTC {
            f.write_str(&self.expression)
        } else {
            write!(f, "{} ({})", self.expression, self.timezone.name())
        }
    }
}

fn parse_shortcut(expression: &str, shortcut: &str) -> Result<TriggerKind, TriggerError> {
    let lowered = shortcut.to_ascii_lowercase();
    let cron = match lowered.as_str() {
        "yearly" | "annually" => "0 0 1 1 *",
        "monthly" => "0 0 1 * *",
        "weekly" => "0 0 * * SUN",
        "daily" | "midnight" => "0 0 * * *",
        "hourly" => "0 * * * *",
        other => {
            return match other.strip_prefix("every") {
                Some(rest) if rest.starts_with(char::is_whitespace) => {
                    parse_interval(rest.trim()).map(TriggerKind::Interval)
                }
                _ => Err(TriggerError::InvalidCron {
                    expression: expression.to_string(),
                    reason: "unknown shortcut".to_string(),
                }),
            };
        }
    };
    parse_cron(cron)
}

fn parse_cron(expression: &str) -> Result<TriggerKind, TriggerError> {
    let field_count = expression.split_whitespace().count();
    let normalized = match field_count {
        5 => format!("0 {expression}"),
        6 | 7 => expression.to_string(),
        n => {
            return Err(TriggerError::InvalidCron {
                expression: expression.to_string(),
                reason: format!("expected 5 to 7 fields, got {n}"),
            });
        }
    };

    cron::Schedule::from_str(&normalized)
        .map(|s| TriggerKind::Cron(Box::new(s)))
        .map_err(|e| TriggerError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}

/// Parse `90s`, `5m`, `1h30m`, `2d` into a duration.
fn parse_interval(text: &str) -> Result<Duration, TriggerError> {
    let invalid = || TriggerError::InvalidInterval(text.to_string());

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            _ => return Err(invalid()),
        };
        let amount: u64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        total = amount
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
    }

    if !digits.is_empty() || total == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}
