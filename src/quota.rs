//! Daily and monthly request budget for the grading model.
//!
//! Counters live in a JSON file keyed by counter id:
//!
//! ```json
//! { "gemini_api": { "daily":   { "date": "2025-05-01", "count": 3 },
//!                   "monthly": { "month": "2025-05", "count": 41 },
//!                   "limits":  { "daily": 10, "monthly": 300 } } }
//! ```
//!
//! A new day resets the daily count and a new month resets the monthly count.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::QuotaConfig;
use crate::error::{GradeError, QuotaDenial};

/// Snapshot of the budget at the time of a check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotaStatus {
    pub allowed: bool,
    /// Why the request is refused; `None` when allowed
    pub reason: Option<QuotaDenial>,
    pub daily_count: u32,
    pub monthly_count: u32,
    pub daily_limit: u32,
    pub monthly_limit: u32,
    pub daily_remaining: u32,
    pub monthly_remaining: u32,
}

impl QuotaStatus {
    fn from_counts(daily_count: u32, monthly_count: u32, limits: Limits) -> Self {
        let daily_remaining = limits.daily.saturating_sub(daily_count);
        let monthly_remaining = limits.monthly.saturating_sub(monthly_count);
        let allowed = daily_remaining > 0 && monthly_remaining > 0;
        let reason = match (allowed, daily_remaining) {
            (true, _) => None,
            (false, 0) => Some(QuotaDenial::DailyExceeded),
            (false, _) => Some(QuotaDenial::MonthlyExceeded),
        };

        Self {
            allowed,
            reason,
            daily_count,
            monthly_count,
            daily_limit: limits.daily,
            monthly_limit: limits.monthly,
            daily_remaining,
            monthly_remaining,
        }
    }
}

impl fmt::Display for QuotaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Daily: {}/{} ({} remaining), Monthly: {}/{} ({} remaining)",
            self.daily_count,
            self.daily_limit,
            self.daily_remaining,
            self.monthly_count,
            self.monthly_limit,
            self.monthly_remaining
        )
    }
}

/// Gate in front of every model request.
pub trait QuotaGate {
    fn check_quota(&self) -> Result<QuotaStatus, GradeError>;

    /// Counts one request. Returns `false` without counting when the budget
    /// is already spent.
    fn record_usage(&self) -> Result<bool, GradeError>;
}

/// No budget at all.
pub struct Unlimited;

impl QuotaGate for Unlimited {
    fn check_quota(&self) -> Result<QuotaStatus, GradeError> {
        Ok(QuotaStatus::from_counts(
            0,
            0,
            Limits {
                daily: u32::MAX,
                monthly: u32::MAX,
            },
        ))
    }

    fn record_usage(&self) -> Result<bool, GradeError> {
        Ok(true)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Limits {
    daily: u32,
    monthly: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DailyCount {
    date: String,
    count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct MonthlyCount {
    month: String,
    count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Counter {
    daily: DailyCount,
    monthly: MonthlyCount,
    limits: Limits,
}

impl Counter {
    fn fresh(today: NaiveDate, limits: Limits) -> Self {
        Self {
            daily: DailyCount {
                date: day_key(today),
                count: 0,
            },
            monthly: MonthlyCount {
                month: month_key(today),
                count: 0,
            },
            limits,
        }
    }

    /// Resets counts that belong to an earlier day or month.
    fn roll_over(&mut self, today: NaiveDate) {
        let day = day_key(today);
        if self.daily.date != day {
            self.daily = DailyCount {
                date: day,
                count: 0,
            };
        }
        let month = month_key(today);
        if self.monthly.month != month {
            self.monthly = MonthlyCount { month, count: 0 };
        }
    }

    fn status(&self) -> QuotaStatus {
        QuotaStatus::from_counts(self.daily.count, self.monthly.count, self.limits)
    }
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Counters persisted to a local JSON file.
pub struct FileQuota {
    path: PathBuf,
    counter_id: String,
    limits: Limits,
}

impl FileQuota {
    pub fn new(path: impl Into<PathBuf>, counter_id: impl Into<String>, daily: u32, monthly: u32) -> Self {
        Self {
            path: path.into(),
            counter_id: counter_id.into(),
            limits: Limits { daily, monthly },
        }
    }

    pub fn from_config(config: &QuotaConfig) -> Self {
        Self::new(
            config.resolved_counter_path(),
            config.counter_id.clone(),
            config.daily_limit,
            config.monthly_limit,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, Counter> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&contents) {
            Ok(counters) => counters,
            Err(e) => {
                crate::log(&format!(
                    "Usage counter {} unreadable ({}), starting fresh",
                    self.path.display(),
                    e
                ));
                BTreeMap::new()
            }
        }
    }

    fn save(&self, counters: &BTreeMap<String, Counter>) -> Result<(), GradeError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(counters).map_err(std::io::Error::from)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Current counter for `today`, with configured limits applied.
    fn current(&self, counters: &BTreeMap<String, Counter>, today: NaiveDate) -> Counter {
        let mut counter = counters
            .get(&self.counter_id)
            .cloned()
            .unwrap_or_else(|| Counter::fresh(today, self.limits));
        counter.roll_over(today);
        counter.limits = self.limits;
        counter
    }

    pub fn check_quota_at(&self, today: NaiveDate) -> Result<QuotaStatus, GradeError> {
        let counters = self.load();
        Ok(self.current(&counters, today).status())
    }

    pub fn record_usage_at(&self, today: NaiveDate) -> Result<bool, GradeError> {
        let mut counters = self.load();
        let mut counter = self.current(&counters, today);

        if !counter.status().allowed {
            crate::log("Usage not recorded: request budget already spent");
            return Ok(false);
        }

        counter.daily.count += 1;
        counter.monthly.count += 1;
        crate::log(&format!(
            "Usage recorded for {}: {}",
            self.counter_id,
            counter.status()
        ));
        counters.insert(self.counter_id.clone(), counter);
        self.save(&counters)?;
        Ok(true)
    }
}

impl QuotaGate for FileQuota {
    fn check_quota(&self) -> Result<QuotaStatus, GradeError> {
        self.check_quota_at(Local::now().date_naive())
    }

    fn record_usage(&self) -> Result<bool, GradeError> {
        self.record_usage_at(Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_fresh_counter_allows() {
        let dir = tempdir().unwrap();
        let quota = FileQuota::new(dir.path().join("usage.json"), "gemini_api", 10, 300);

        let status = quota.check_quota_at(date(2025, 5, 1)).unwrap();
        assert!(status.allowed);
        assert_eq!(status.reason, None);
        assert_eq!(status.daily_remaining, 10);
        assert_eq!(status.monthly_remaining, 300);
        // Checking does not create the file
        assert!(!quota.path().exists());
    }

    #[test]
    fn test_daily_limit_denies() {
        let dir = tempdir().unwrap();
        let quota = FileQuota::new(dir.path().join("usage.json"), "gemini_api", 2, 300);
        let today = date(2025, 5, 1);

        assert!(quota.record_usage_at(today).unwrap());
        assert!(quota.record_usage_at(today).unwrap());
        // Third request refused and not counted
        assert!(!quota.record_usage_at(today).unwrap());

        let status = quota.check_quota_at(today).unwrap();
        assert!(!status.allowed);
        assert_eq!(status.reason, Some(QuotaDenial::DailyExceeded));
        assert_eq!(status.daily_count, 2);
        assert_eq!(status.monthly_count, 2);
    }

    #[test]
    fn test_monthly_limit_denies() {
        let dir = tempdir().unwrap();
        let quota = FileQuota::new(dir.path().join("usage.json"), "gemini_api", 10, 3);

        assert!(quota.record_usage_at(date(2025, 5, 1)).unwrap());
        assert!(quota.record_usage_at(date(2025, 5, 2)).unwrap());
        assert!(quota.record_usage_at(date(2025, 5, 3)).unwrap());

        let status = quota.check_quota_at(date(2025, 5, 4)).unwrap();
        assert!(!status.allowed);
        assert_eq!(status.reason, Some(QuotaDenial::MonthlyExceeded));
        assert_eq!(status.daily_remaining, 10);
    }

    #[test]
    fn test_daily_and_monthly_rollover() {
        let dir = tempdir().unwrap();
        let quota = FileQuota::new(dir.path().join("usage.json"), "gemini_api", 1, 2);

        assert!(quota.record_usage_at(date(2025, 5, 31)).unwrap());
        assert!(!quota.check_quota_at(date(2025, 5, 31)).unwrap().allowed);

        // New day in a new month
        let status = quota.check_quota_at(date(2025, 6, 1)).unwrap();
        assert!(status.allowed);
        assert_eq!(status.daily_count, 0);
        assert_eq!(status.monthly_count, 0);

        // New day, same month keeps the monthly count
        assert!(quota.record_usage_at(date(2025, 6, 1)).unwrap());
        let status = quota.check_quota_at(date(2025, 6, 2)).unwrap();
        assert_eq!(status.daily_count, 0);
        assert_eq!(status.monthly_count, 1);
    }

    #[test]
    fn test_counters_are_independent_per_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let a = FileQuota::new(&path, "a", 1, 10);
        let b = FileQuota::new(&path, "b", 1, 10);
        let today = date(2025, 1, 1);

        assert!(a.record_usage_at(today).unwrap());
        assert!(!a.check_quota_at(today).unwrap().allowed);
        assert!(b.check_quota_at(today).unwrap().allowed);
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.json");
        fs::write(&path, "not json").unwrap();
        let quota = FileQuota::new(&path, "gemini_api", 10, 300);

        assert!(quota.check_quota_at(date(2025, 1, 1)).unwrap().allowed);
        assert!(quota.record_usage_at(date(2025, 1, 1)).unwrap());
        let saved = fs::read_to_string(&path).unwrap();
        assert!(saved.contains("\"gemini_api\""));
        assert!(saved.contains("\"2025-01\""));
    }

    #[test]
    fn test_unlimited_always_allows() {
        let status = Unlimited.check_quota().unwrap();
        assert!(status.allowed);
        assert!(Unlimited.record_usage().unwrap());
    }

    #[test]
    fn test_status_display() {
        let status = QuotaStatus::from_counts(3, 41, Limits { daily: 10, monthly: 300 });
        assert_eq!(
            status.to_string(),
            "Daily: 3/10 (7 remaining), Monthly: 41/300 (259 remaining)"
        );
    }
}
