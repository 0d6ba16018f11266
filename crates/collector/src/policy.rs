// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Filename filtering and renaming
//!
//! A [`FileNamePolicy`] decides for each remote filename whether it is in
//! scope and what name it gets at the primary destination.
//!
//! Renamed files are called `<prefix>_<YYYYMMDDHHmmss>.<ext>`, with the
//! timestamp taken in the configured time zone. The extension is the text
//! between the first and second dot of the original name, so
//! `cdr.2021.csv` becomes `<prefix>_<ts>.2021`. Names without any dot are
//! renamed without an extension.

use crate::error::ConfigError;
use crate::profile::{RenameResolution, ServerProfile};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::Mutex;

/// Default time zone for generated names
pub const DEFAULT_TIME_ZONE: &str = "Pacific/Auckland";

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Resolve an IANA time zone name
pub fn parse_time_zone(name: &str) -> Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::InvalidTimeZone(name.to_string()))
}

/// Outcome of applying the policy to one filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameDecision {
    Skip,
    Keep(String),
}

/// How renamed output files are named
#[derive(Debug, Clone)]
pub struct RenameRule {
    pub prefix: String,
    pub time_zone: Tz,
    pub resolution: RenameResolution,
}

impl RenameRule {
    #[must_use]
    pub fn new(prefix: impl Into<String>, time_zone: Tz) -> Self {
        Self {
            prefix: prefix.into(),
            time_zone,
            resolution: RenameResolution::Seconds,
        }
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: RenameResolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Generate the output name for `filename` at time `now`
    #[must_use]
    pub fn output_name(&self, filename: &str, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.time_zone);
        let stamp = match self.resolution {
            RenameResolution::Seconds => local.format("%Y%m%d%H%M%S").to_string(),
            RenameResolution::Nanoseconds => local.format("%Y%m%d%H%M%S%9f").to_string(),
        };
        match extension(filename) {
            Some(ext) => format!("{}_{stamp}.{ext}", self.prefix),
            None => format!("{}_{stamp}", self.prefix),
        }
    }
}

/// The segment after the first dot, up to the next dot
fn extension(filename: &str) -> Option<&str> {
    filename.split('.').nth(1)
}

/// Filter plus optional rename, compiled once per run
#[derive(Debug, Clone)]
pub struct FileNamePolicy {
    filter: Option<Regex>,
    rename: Option<RenameRule>,
}

impl FileNamePolicy {
    #[must_use]
    pub fn new(filter: Option<Regex>, rename: Option<RenameRule>) -> Self {
        Self { filter, rename }
    }

    /// Build the policy a profile asks for
    pub fn from_profile(profile: &ServerProfile, time_zone: Tz) -> Result<Self, ConfigError> {
        let filter = match profile.filter_pattern() {
            Some(pattern) => Some(Regex::new(pattern).map_err(|source| {
                ConfigError::InvalidFilter {
                    pattern: pattern.to_string(),
                    source,
                }
            })?),
            None => None,
        };

        let rename = if profile.rename_enabled {
            let prefix = profile
                .rename_prefix()
                .ok_or(ConfigError::MissingRenamePrefix)?;
            Some(RenameRule::new(prefix, time_zone).with_resolution(profile.rename_resolution))
        } else {
            None
        };

        Ok(Self::new(filter, rename))
    }

    /// Whether `filename` is in scope (search semantics, not full match)
    #[must_use]
    pub fn matches(&self, filename: &str) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.is_match(filename))
    }

    /// Name at the primary destination for an in-scope `filename`
    #[must_use]
    pub fn output_name(&self, filename: &str, now: DateTime<Utc>) -> String {
        match &self.rename {
            Some(rule) => rule.output_name(filename, now),
            None => filename.to_string(),
        }
    }

    #[must_use]
    pub fn decide(&self, filename: &str, now: DateTime<Utc>) -> NameDecision {
        if !self.matches(filename) {
            return NameDecision::Skip;
        }
        NameDecision::Keep(self.output_name(filename, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn auckland() -> Tz {
        parse_time_zone(DEFAULT_TIME_ZONE).expect("known zone")
    }

    fn at(h: u32, m: u32, s: u32, nanos: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, h, m, s)
            .single()
            .expect("valid time")
            + chrono::Duration::nanoseconds(i64::from(nanos))
    }

    fn filtered(pattern: &str) -> FileNamePolicy {
        FileNamePolicy::new(Some(Regex::new(pattern).expect("valid regex")), None)
    }

    #[test]
    fn test_no_filter_keeps_everything() {
        let policy = FileNamePolicy::new(None, None);
        for name in ["F20210101.ic", "README.txt", "noext", "a.b.c"] {
            assert_eq!(
                policy.decide(name, at(0, 0, 0, 0)),
                NameDecision::Keep(name.to_string())
            );
        }
    }

    #[test]
    fn test_filter_uses_search_semantics() {
        let policy = filtered("2021");
        assert_eq!(
            policy.decide("F20210101.ic", at(0, 0, 0, 0)),
            NameDecision::Keep("F20210101.ic".to_string())
        );
        assert_eq!(policy.decide("F2020.ic", at(0, 0, 0, 0)), NameDecision::Skip);
    }

    #[test]
    fn test_filter_correctness() {
        let policy = filtered("^F2021");
        let names = [
            "F20210101.ic",
            "F2021",
            "xF2021.ic",
            "README.txt",
            "f20210101.ic",
            "F202012300001001.txt",
        ];
        let re = Regex::new("^F2021").expect("valid regex");
        for name in names {
            let kept = policy.decide(name, at(0, 0, 0, 0)) != NameDecision::Skip;
            assert_eq!(kept, re.is_match(name), "{name}");
        }
    }

    #[test]
    fn test_identity_without_rename() {
        let policy = FileNamePolicy::new(None, None);
        for name in ["a.tar.gz", ".hidden", "trailing.", "F2021"] {
            assert_eq!(
                policy.decide(name, at(3, 4, 5, 6)),
                NameDecision::Keep(name.to_string())
            );
        }
    }

    #[test]
    fn test_rename_uses_local_time() {
        // 2021-01-01T00:00:00Z is 13:00 NZDT
        let rule = RenameRule::new("airgate", auckland());
        let policy = FileNamePolicy::new(None, Some(rule));
        assert_eq!(
            policy.decide("cdr_0001.txt", at(0, 0, 0, 0)),
            NameDecision::Keep("airgate_20210101130000.txt".to_string())
        );
    }

    #[test]
    fn test_rename_extension_is_second_segment() {
        let rule = RenameRule::new("p", chrono_tz::UTC);
        assert_eq!(rule.output_name("a.tar.gz", at(1, 2, 3, 0)), "p_20210101010203.tar");
        assert_eq!(rule.output_name("noext", at(1, 2, 3, 0)), "p_20210101010203");
        assert_eq!(rule.output_name("trailing.", at(1, 2, 3, 0)), "p_20210101010203.");
    }

    #[test]
    fn test_rename_collides_within_one_second() {
        let rule = RenameRule::new("mmsc", auckland());
        let first = rule.output_name("one.txt", at(10, 0, 0, 1_000));
        let second = rule.output_name("two.txt", at(10, 0, 0, 999_000_000));
        assert_eq!(first, second);
    }

    #[test]
    fn test_nanosecond_resolution_separates_names() {
        let rule = RenameRule::new("mmsc", chrono_tz::UTC)
            .with_resolution(RenameResolution::Nanoseconds);
        let first = rule.output_name("one.txt", at(10, 0, 0, 1_000));
        let second = rule.output_name("two.txt", at(10, 0, 0, 999_000_000));
        assert_ne!(first, second);
        assert_eq!(first, "mmsc_20210101100000000001000.txt");
    }

    #[test]
    fn test_filtered_out_never_renamed() {
        let rule = RenameRule::new("p", chrono_tz::UTC);
        let policy = FileNamePolicy::new(Some(Regex::new("^F").expect("valid regex")), Some(rule));
        assert_eq!(policy.decide("README.txt", at(0, 0, 0, 0)), NameDecision::Skip);
    }

    #[test]
    fn test_from_profile() {
        use crate::profile::{Endpoint, Secret};
        let endpoint = Endpoint {
            host: "h".to_string(),
            port: 22,
            user: "u".to_string(),
            secret: Secret::new("s"),
        };
        let mut profile = ServerProfile::new("srv", endpoint, "/in", "out");
        profile.filename_filter = Some("^F".to_string());
        profile.rename_enabled = true;
        profile.rename_prefix = Some("srv".to_string());

        let policy = FileNamePolicy::from_profile(&profile, chrono_tz::UTC).expect("valid");
        assert_eq!(
            policy.decide("F1.ic", at(0, 0, 0, 0)),
            NameDecision::Keep("srv_20210101000000.ic".to_string())
        );

        profile.rename_prefix = None;
        assert!(matches!(
            FileNamePolicy::from_profile(&profile, chrono_tz::UTC),
            Err(ConfigError::MissingRenamePrefix)
        ));
    }

    #[test]
    fn test_time_zone_parsing() {
        assert!(parse_time_zone("Pacific/Auckland").is_ok());
        assert!(matches!(
            parse_time_zone("Mars/Olympus"),
            Err(ConfigError::InvalidTimeZone(_))
        ));
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(at(0, 0, 0, 0));
        assert_eq!(clock.now(), at(0, 0, 0, 0));
        clock.set(at(1, 0, 0, 0));
        assert_eq!(clock.now(), at(1, 0, 0, 0));
    }
}
