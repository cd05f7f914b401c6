//! Roster loading and allow-list derivation.
//!
//! The roster CSV is the source of truth for which humans are in scope, plus
//! per-employee metadata consumed by name from free-form columns. When a
//! leaderboard export is also supplied, the effective allow-list is the
//! intersection of the two email sets: absence from either source is treated
//! as evidence the identity is stale. An empty set at any stage collapses to
//! the empty roster, which downstream code treats as "do not filter".

use crate::models::UserMetadata;
use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default, Clone)]
pub struct Roster {
    allowed: BTreeSet<String>,
    metadata: HashMap<String, UserMetadata>,
}

impl Roster {
    /// Load the roster CSV. A missing file degrades to the empty roster with
    /// a warning; the run proceeds unfiltered.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "roster file not found; no email filtering will be applied");
            return Ok(Self::default());
        }

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let email_idx = match column("email") {
            Some(idx) => idx,
            None => {
                warn!(path = %path.display(), "roster file has no 'email' column; no email filtering will be applied");
                return Ok(Self::default());
            }
        };
        let chapter_idx = column("chapter");
        let squad_idx = column("Current Squad");
        let manager_idx = column("Manager");
        let target_idx = column("Target_Threshold");

        let mut roster = Self::default();
        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    warn!(%err, "skipping malformed roster row");
                    continue;
                }
            };
            let email = record
                .get(email_idx)
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            if email.is_empty() {
                continue;
            }
            let field = |idx: Option<usize>| {
                idx.and_then(|i| record.get(i))
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            };
            let metadata = UserMetadata {
                chapter: field(chapter_idx),
                squad: field(squad_idx),
                manager: field(manager_idx),
                target_threshold: field(target_idx).parse().ok(),
            };
            // Last row wins on duplicate email.
            roster.allowed.insert(email.clone());
            roster.metadata.insert(email, metadata);
        }

        info!(emails = roster.allowed.len(), path = %path.display(), "loaded roster");
        Ok(roster)
    }

    /// Intersect with a second identity source. Either side being empty, or
    /// an empty intersection, collapses to the unfiltered roster.
    pub fn intersect_with(self, other_emails: &BTreeSet<String>) -> Self {
        if self.allowed.is_empty() {
            return self;
        }
        if other_emails.is_empty() {
            warn!("second identity source is empty; no email filtering will be applied");
            return Self::default();
        }
        let allowed: BTreeSet<String> = self
            .allowed
            .intersection(other_emails)
            .cloned()
            .collect();
        if allowed.is_empty() {
            warn!("no emails in the intersection of roster and second identity source; no email filtering will be applied");
            return Self::default();
        }
        let metadata = self
            .metadata
            .into_iter()
            .filter(|(email, _)| allowed.contains(email))
            .collect();
        info!(emails = allowed.len(), "allow-list restricted to roster/leaderboard intersection");
        Self { allowed, metadata }
    }

    /// Allow-list membership. The empty roster filters nothing.
    pub fn is_allowed(&self, email: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(email)
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn emails(&self) -> &BTreeSet<String> {
        &self.allowed
    }

    pub fn metadata(&self, email: &str) -> Option<&UserMetadata> {
        self.metadata.get(email)
    }

    #[cfg(test)]
    pub fn from_emails<'a>(emails: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            allowed: emails.into_iter().map(str::to_string).collect(),
            metadata: HashMap::new(),
        }
    }
}

/// Load the email column of a leaderboard-style export (header `Email`).
/// Missing file or column degrades to the empty set with a warning.
pub fn load_leaderboard_emails(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        warn!(path = %path.display(), "leaderboard file not found");
        return Ok(BTreeSet::new());
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let Some(email_idx) = headers.iter().position(|h| h == "Email") else {
        warn!(path = %path.display(), "leaderboard file has no 'Email' column");
        return Ok(BTreeSet::new());
    };

    let mut emails = BTreeSet::new();
    for record in reader.records() {
        let Ok(record) = record else { continue };
        let email = record
            .get(email_idx)
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        if !email.is_empty() {
            emails.insert(email);
        }
    }
    info!(emails = emails.len(), path = %path.display(), "loaded leaderboard emails");
    Ok(emails)
}

/// Locate a leaderboard export under a directory by glob pattern, e.g.
/// `*User_Leaderboard*.csv`. Returns the first match in sorted order.
pub fn find_leaderboard_file(dir: &Path, pattern: &str) -> Option<std::path::PathBuf> {
    let full_pattern = dir.join(pattern);
    let mut matches: Vec<_> = glob::glob(&full_pattern.to_string_lossy())
        .ok()?
        .flatten()
        .collect();
    matches.sort();
    matches.into_iter().next()
}
