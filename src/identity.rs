//! Identity reconciliation: source logins to canonical emails.
//!
//! The mapping file is a flat `login -> email` JSON object consumed wholesale.
//! Unmapped logins pass through as their own pseudo-identity (lowercased) so
//! events are never dropped for lack of a mapping; logins that resolve to
//! something that is clearly not an email are collected for a single
//! end-of-load diagnostic.

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Token marking an identity that is intentionally not a company email.
const NON_COMPANY_PLACEHOLDER: &str = "not fs";

#[derive(Debug, Default)]
pub struct IdentityMap {
    mappings: HashMap<String, String>,
    suspicious: BTreeSet<String>,
}

impl IdentityMap {
    /// Load the login->email mapping. A missing file degrades to an empty
    /// map (logins stand in for emails) rather than failing the run.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no email mappings file found; logins will be used as identifiers");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mappings: HashMap<String, String> = serde_json::from_str(&content)?;
        info!(users = mappings.len(), "loaded email mappings");
        Ok(Self {
            mappings,
            suspicious: BTreeSet::new(),
        })
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            mappings: pairs
                .iter()
                .map(|(login, email)| (login.to_string(), email.to_string()))
                .collect(),
            suspicious: BTreeSet::new(),
        }
    }

    /// Resolve a login to its canonical lowercased email, recording the login
    /// as suspicious when the result does not look like a company identity.
    pub fn resolve(&mut self, login: &str) -> String {
        let resolved = self
            .mappings
            .get(login)
            .map(String::as_str)
            .unwrap_or(login)
            .to_lowercase();
        if resolved.is_empty()
            || (!resolved.contains('@') && !resolved.contains(NON_COMPANY_PLACEHOLDER))
        {
            self.suspicious.insert(login.to_string());
        }
        resolved
    }

    /// Emit the end-of-load diagnostic for suspicious logins, deduplicated
    /// and sorted.
    pub fn report_suspicious(&self) {
        if self.suspicious.is_empty() {
            return;
        }
        warn!(
            count = self.suspicious.len(),
            logins = ?self.suspicious,
            "logins without a mapped non-empty email"
        );
    }

    pub fn suspicious(&self) -> &BTreeSet<String> {
        &self.suspicious
    }
}
