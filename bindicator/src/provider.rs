/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Bin-collection date sources.
//!
//! The device only needs "which bin, in how many days".  Everything about
//! where that comes from (a council website, a file, a fixture) stays behind
//! [`BinDateProvider`].  A provider never fails loudly: an empty map means
//! "no data right now" and the jobs layer shows the error indication.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::{debug, warn};

use crate::clock::days_between;

/// Bin label → days until collection (0 = today).
pub type BinDates = BTreeMap<String, i64>;

/// Source of upcoming collection dates.
///
/// `fetch` may block (network, disk); the jobs layer calls it from the
/// blocking thread pool.
pub trait BinDateProvider: Send + Sync {
    fn fetch(&self) -> BinDates;
}

/// The bin collected soonest that has not already passed.
///
/// Ties are broken by label order.
pub fn soonest(dates: &BinDates) -> Option<(&str, i64)> {
    dates
        .iter()
        .map(|(label, days)| (label.as_str(), *days))
        .filter(|&(_, days)| days >= 0)
        .min_by_key(|&(label, days)| (days, label))
}

// ── StaticDates ───────────────────────────────────────────────────────────────

/// Fixed mapping; useful for demos and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDates(pub BinDates);

impl BinDateProvider for StaticDates {
    fn fetch(&self) -> BinDates {
        self.0.clone()
    }
}

// ── DateFile ──────────────────────────────────────────────────────────────────

/// YAML file of `label: YYYY-MM-DD` collection dates.
///
/// ```yaml
/// general: 2026-10-20
/// recycling: 2026-10-27
/// ```
///
/// Re-read on every fetch so an external scraper can keep it current.
#[derive(Debug, Clone)]
pub struct DateFile {
    path: PathBuf,
}

impl DateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self, today: NaiveDate) -> Result<BinDates> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot open bin date file: {}", self.path.display()))?;
        let raw: BTreeMap<String, String> = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse bin date file: {}", self.path.display()))?;

        let mut dates = BinDates::new();
        for (label, text) in raw {
            let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .with_context(|| format!("Bad date for '{label}': {text}"))?;
            let days = days_between(today, date);
            debug!(label = %label, %date, days, "bin date read");
            dates.insert(label, days);
        }
        Ok(dates)
    }

    /// Fetch relative to an explicit `today`.
    pub fn fetch_on(&self, today: NaiveDate) -> BinDates {
        match self.read(today) {
            Ok(dates) => dates,
            Err(err) => {
                warn!("Bin date file unavailable: {:#}", err);
                BinDates::new()
            }
        }
    }
}

impl BinDateProvider for DateFile {
    fn fetch(&self) -> BinDates {
        self.fetch_on(Local::now().date_naive())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
