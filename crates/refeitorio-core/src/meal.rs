//! Meal categories and the time-window classifier.
//!
//! A capture instant is converted into a single canonical local time zone and
//! matched against half-open `[start, end)` windows. Any minute not covered by
//! a window falls into the policy's default category, so classification is
//! total: every instant maps to exactly one [`MealCategory`].

use std::str::FromStr as _;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset as _, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Category ────────────────────────────────────────────────────────────────

/// The closed set of meals a worker may be entitled to.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::EnumIter,
  strum::AsRefStr,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MealCategory {
  Breakfast,
  Lunch,
  Dinner,
  LateSnack,
}

impl MealCategory {
  /// Human-readable label used in end-user messages.
  pub fn label(self) -> &'static str {
    match self {
      Self::Breakfast => "Breakfast",
      Self::Lunch => "Lunch",
      Self::Dinner => "Dinner",
      Self::LateSnack => "Late snack",
    }
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// A half-open `[start, end)` range of local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealWindow {
  pub category: MealCategory,
  pub start:    NaiveTime,
  pub end:      NaiveTime,
}

impl MealWindow {
  pub fn new(category: MealCategory, start: NaiveTime, end: NaiveTime) -> Self {
    Self { category, start, end }
  }

  pub fn contains(&self, t: NaiveTime) -> bool { self.start <= t && t < self.end }

  fn overlaps(&self, other: &Self) -> bool {
    self.start < other.end && other.start < self.end
  }
}

/// Configuration for [`MealClassifier`], deserialised from the `[meals]`
/// section of the server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MealPolicy {
  /// IANA zone name, e.g. `America/Sao_Paulo`.
  pub time_zone:                   String,
  /// Offset applied when `time_zone` cannot be resolved.
  pub fallback_utc_offset_minutes: i32,
  /// Category for any minute not covered by `windows`.
  pub default_category:            MealCategory,
  pub windows:                     Vec<MealWindow>,
  /// Benefit value recorded on every registration, in cents.
  pub value_cents:                 i64,
}

fn hm(h: u32, m: u32) -> NaiveTime {
  NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for MealPolicy {
  fn default() -> Self {
    Self {
      time_zone:                   "America/Sao_Paulo".to_owned(),
      fallback_utc_offset_minutes: -180,
      default_category:            MealCategory::LateSnack,
      windows:                     vec![
        MealWindow::new(MealCategory::Breakfast, hm(6, 0), hm(11, 0)),
        MealWindow::new(MealCategory::Lunch, hm(11, 0), hm(18, 0)),
        MealWindow::new(MealCategory::Dinner, hm(18, 0), hm(22, 0)),
      ],
      value_cents:                 1700,
    }
  }
}

// ─── Classifier ──────────────────────────────────────────────────────────────

/// The zone in which meal windows and calendar days are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalZone {
  Named(Tz),
  /// Used when the configured zone name could not be resolved.
  Fixed(FixedOffset),
}

/// The result of classifying one capture instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
  pub category:   MealCategory,
  /// Calendar day in the canonical zone; the duplicate-detection key.
  pub local_date: NaiveDate,
  pub local_time: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct MealClassifier {
  zone:             CanonicalZone,
  windows:          Vec<MealWindow>,
  default_category: MealCategory,
}

impl MealClassifier {
  /// Validate `policy` and resolve its time zone.
  ///
  /// Window validation errors are fatal. A zone that cannot be resolved is
  /// not: the fixed fallback offset is used instead and the problem is logged.
  pub fn new(policy: &MealPolicy) -> Result<Self> {
    for w in &policy.windows {
      if w.start >= w.end {
        return Err(Error::EmptyWindow {
          category: w.category,
          start:    w.start,
          end:      w.end,
        });
      }
    }
    for (i, a) in policy.windows.iter().enumerate() {
      if let Some(b) = policy.windows[i + 1..].iter().find(|b| a.overlaps(b)) {
        return Err(Error::OverlappingWindows {
          first:  a.category,
          second: b.category,
        });
      }
    }

    let zone = match Tz::from_str(&policy.time_zone) {
      Ok(tz) => CanonicalZone::Named(tz),
      Err(e) => {
        let offset = fallback_offset(policy.fallback_utc_offset_minutes);
        tracing::error!(
          zone = %policy.time_zone,
          %offset,
          "time zone lookup failed ({e}); classifying with fixed offset"
        );
        CanonicalZone::Fixed(offset)
      }
    };

    Ok(Self {
      zone,
      windows: policy.windows.clone(),
      default_category: policy.default_category,
    })
  }

  pub fn zone(&self) -> CanonicalZone { self.zone }

  /// Map an instant to its meal category and local calendar day. Total.
  pub fn classify(&self, at: DateTime<Utc>) -> Classification {
    let local = match self.zone {
      CanonicalZone::Named(tz) => at.with_timezone(&tz).naive_local(),
      CanonicalZone::Fixed(offset) => at.with_timezone(&offset).naive_local(),
    };
    let local_time = local.time();
    let category = self
      .windows
      .iter()
      .find(|w| w.contains(local_time))
      .map(|w| w.category)
      .unwrap_or(self.default_category);

    Classification { category, local_date: local.date(), local_time }
  }

  /// Today's date in the canonical zone.
  pub fn today(&self) -> NaiveDate { self.classify(Utc::now()).local_date }
}

fn fallback_offset(minutes: i32) -> FixedOffset {
  minutes
    .checked_mul(60)
    .and_then(FixedOffset::east_opt)
    .unwrap_or_else(|| Utc.fix())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone as _, Timelike as _};
  use strum::IntoEnumIterator as _;

  fn default_classifier() -> MealClassifier {
    MealClassifier::new(&MealPolicy::default()).unwrap()
  }

  /// Build the UTC instant for a São Paulo wall-clock time (UTC-3, no DST).
  fn sao_paulo(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 14, h, m, 0).unwrap() + Duration::hours(3)
  }

  #[test]
  fn default_policy_maps_hours_to_categories() {
    let c = default_classifier();
    assert_eq!(c.classify(sao_paulo(5, 59)).category, MealCategory::LateSnack);
    assert_eq!(c.classify(sao_paulo(6, 0)).category, MealCategory::Breakfast);
    assert_eq!(c.classify(sao_paulo(10, 59)).category, MealCategory::Breakfast);
    assert_eq!(c.classify(sao_paulo(11, 0)).category, MealCategory::Lunch);
    assert_eq!(c.classify(sao_paulo(17, 59)).category, MealCategory::Lunch);
    assert_eq!(c.classify(sao_paulo(18, 0)).category, MealCategory::Dinner);
    assert_eq!(c.classify(sao_paulo(22, 0)).category, MealCategory::LateSnack);
    assert_eq!(c.classify(sao_paulo(23, 30)).category, MealCategory::LateSnack);
  }

  #[test]
  fn every_minute_of_the_day_has_exactly_one_category() {
    let c = default_classifier();
    let start = sao_paulo(0, 0);
    let mut seen = std::collections::HashSet::new();
    for minute in 0..(24 * 60) {
      let at = start + Duration::minutes(minute);
      let class = c.classify(at);
      let matching = MealPolicy::default()
        .windows
        .iter()
        .filter(|w| w.contains(class.local_time))
        .count();
      assert!(matching <= 1, "overlap at {}", class.local_time);
      seen.insert(class.category);
    }
    for category in MealCategory::iter() {
      assert!(seen.contains(&category), "{category} never produced");
    }
  }

  #[test]
  fn local_date_follows_the_canonical_zone() {
    let c = default_classifier();
    // 01:30 UTC on the 15th is still 22:30 on the 14th in São Paulo.
    let at = Utc.with_ymd_and_hms(2025, 10, 15, 1, 30, 0).unwrap();
    let class = c.classify(at);
    assert_eq!(class.local_date, NaiveDate::from_ymd_opt(2025, 10, 14).unwrap());
    assert_eq!(class.local_time.hour(), 22);
    assert_eq!(class.category, MealCategory::LateSnack);
  }

  #[test]
  fn unknown_zone_falls_back_to_fixed_offset() {
    let policy = MealPolicy {
      time_zone: "Mars/Olympus_Mons".to_owned(),
      ..MealPolicy::default()
    };
    let c = MealClassifier::new(&policy).unwrap();
    assert_eq!(
      c.zone(),
      CanonicalZone::Fixed(FixedOffset::west_opt(3 * 3600).unwrap())
    );
    // 15:00 UTC is 12:00 at UTC-3.
    let at = Utc.with_ymd_and_hms(2025, 10, 14, 15, 0, 0).unwrap();
    assert_eq!(c.classify(at).category, MealCategory::Lunch);
  }

  #[test]
  fn residual_hours_use_the_configured_default() {
    let policy = MealPolicy {
      default_category: MealCategory::Dinner,
      windows: vec![MealWindow::new(MealCategory::Lunch, hm(11, 0), hm(14, 0))],
      ..MealPolicy::default()
    };
    let c = MealClassifier::new(&policy).unwrap();
    assert_eq!(c.classify(sao_paulo(3, 0)).category, MealCategory::Dinner);
    assert_eq!(c.classify(sao_paulo(12, 0)).category, MealCategory::Lunch);
  }

  #[test]
  fn overlapping_windows_are_rejected() {
    let policy = MealPolicy {
      windows: vec![
        MealWindow::new(MealCategory::Breakfast, hm(6, 0), hm(11, 30)),
        MealWindow::new(MealCategory::Lunch, hm(11, 0), hm(18, 0)),
      ],
      ..MealPolicy::default()
    };
    assert!(matches!(
      MealClassifier::new(&policy),
      Err(Error::OverlappingWindows {
        first:  MealCategory::Breakfast,
        second: MealCategory::Lunch,
      })
    ));
  }

  #[test]
  fn inverted_window_is_rejected() {
    let policy = MealPolicy {
      windows: vec![MealWindow::new(MealCategory::LateSnack, hm(22, 0), hm(6, 0))],
      ..MealPolicy::default()
    };
    assert!(matches!(
      MealClassifier::new(&policy),
      Err(Error::EmptyWindow { category: MealCategory::LateSnack, .. })
    ));
  }

  #[test]
  fn category_discriminants_are_snake_case() {
    assert_eq!(MealCategory::LateSnack.as_ref(), "late_snack");
    assert_eq!("breakfast".parse::<MealCategory>().unwrap(), MealCategory::Breakfast);
    assert_eq!(
      serde_json::to_string(&MealCategory::LateSnack).unwrap(),
      "\"late_snack\""
    );
  }
}
