//! Configuration synchronization
//!
//! A config set is a file of `{"key":value}` lines, one controller setting
//! per line. Synchronizing it against the controller alternates two phases
//! until nothing differs:
//!
//! 1. verify: ask for every key at once (`{"key":n}`), collect the `r`
//!    responses and record each key whose reported value differs
//! 2. correct: rewrite every mismatched key using its line from the set
//!
//! Verification holds the link arbiter for its whole duration so the reader
//! task cannot consume the responses.

use crate::communication::{LineAssembler, LinkArbiter, SessionLog};
use crate::firmware::tinyg::command_creator::{query_line, setting_line};
use crate::firmware::tinyg::reader::drain_channel;
use crate::firmware::tinyg::sender::{write_payload, CommandSender};
use crate::firmware::tinyg::signals::LinkSignals;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tinyg_link_core::{ConfigError, Result};
use tinyg_link_settings::LinkConfig;

/// One expected controller setting
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    /// Setting key, lower-cased
    pub key: String,
    /// Value the controller should report
    pub expected: f64,
    /// The line as written in the set, sent verbatim to correct the setting
    pub line: String,
}

/// Ordered set of expected settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSet {
    entries: Vec<ConfigEntry>,
}

impl ConfigSet {
    /// Read a config set file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse config set text, one `{"key":number}` object per non-blank line
    pub fn parse(content: &str) -> Result<Self> {
        let mut entries: Vec<ConfigEntry> = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let entry = parse_entry(line).map_err(|reason| ConfigError::InvalidLine {
                line_number: index + 1,
                reason,
            })?;

            if let Some(pos) = entries.iter().position(|e| e.key == entry.key) {
                tracing::warn!("Config key '{}' repeated, keeping the last value", entry.key);
                entries[pos] = entry;
            } else {
                entries.push(entry);
            }
        }

        Ok(Self { entries })
    }

    /// Build a set from key/value pairs
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let entries = pairs
            .into_iter()
            .map(|(key, expected)| {
                let key = key.as_ref().to_ascii_lowercase();
                ConfigEntry {
                    line: setting_line(&key, expected),
                    key,
                    expected,
                }
            })
            .collect();
        Self { entries }
    }

    /// Entries in file order
    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    /// Entry for `key` (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&ConfigEntry> {
        self.entries
            .iter()
            .find(|e| e.key.eq_ignore_ascii_case(key))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One payload asking the controller to report every key
    pub fn query_payload(&self) -> String {
        self.entries
            .iter()
            .map(|e| query_line(&e.key))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn parse_entry(line: &str) -> std::result::Result<ConfigEntry, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let obj = value
        .as_object()
        .ok_or_else(|| "expected a JSON object".to_string())?;

    let mut fields = obj.iter();
    let (key, expected) = match (fields.next(), fields.next()) {
        (Some(field), None) => field,
        _ => return Err(format!("expected exactly one key, found {}", obj.len())),
    };
    let expected = expected
        .as_f64()
        .ok_or_else(|| format!("value of '{}' is not a number", key))?;

    Ok(ConfigEntry {
        key: key.to_ascii_lowercase(),
        expected,
        line: line.to_string(),
    })
}

/// A key whose reported value differs from the set
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigMismatch {
    /// Setting key
    pub key: String,
    /// Value from the config set
    pub expected: f64,
    /// Value the controller reported
    pub actual: f64,
    /// Line that corrects it
    pub line: String,
}

/// Outcome of a full synchronization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Verify passes performed
    pub verify_passes: u32,
    /// Keys rewritten, in the order they were corrected
    pub corrected: Vec<String>,
}

impl SyncReport {
    /// Check if the controller already matched
    pub fn was_in_sync(&self) -> bool {
        self.corrected.is_empty()
    }
}

/// Verify cadence and bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Spacing between response reads
    pub query_interval: Duration,
    /// Bound on one verify pass; `None` waits for every key indefinitely
    pub verify_timeout: Option<Duration>,
    /// Bound on correction rounds; `None` loops until convergence
    pub max_correction_rounds: Option<u32>,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            query_interval: Duration::from_millis(500),
            verify_timeout: Some(Duration::from_secs(30)),
            max_correction_rounds: Some(10),
        }
    }
}

impl From<&LinkConfig> for SyncPolicy {
    fn from(config: &LinkConfig) -> Self {
        Self {
            query_interval: Duration::from_millis(config.sync.query_interval_ms),
            verify_timeout: config.sync.verify_timeout_ms.map(Duration::from_millis),
            max_correction_rounds: config.sync.max_correction_rounds,
        }
    }
}

/// Reconciles a [`ConfigSet`] against the controller
#[derive(Clone)]
pub struct ConfigSynchronizer {
    arbiter: Arc<LinkArbiter>,
    signals: Arc<LinkSignals>,
    log: Arc<SessionLog>,
    sender: CommandSender,
    policy: SyncPolicy,
}

impl ConfigSynchronizer {
    /// Create a synchronizer sharing the link's arbiter, signals and sender
    pub fn new(
        arbiter: Arc<LinkArbiter>,
        signals: Arc<LinkSignals>,
        log: Arc<SessionLog>,
        sender: CommandSender,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            arbiter,
            signals,
            log,
            sender,
            policy,
        }
    }

    /// Query every key and return the mismatches in set order
    ///
    /// Each key is settled by the first response naming it, whether or not
    /// the value matches.
    pub async fn verify(&self, set: &ConfigSet) -> Result<Vec<ConfigMismatch>> {
        self.signals.ensure_clear()?;
        if set.is_empty() {
            return Ok(Vec::new());
        }

        let _turn = self.sender.take_turn().await;
        let mut link = self.arbiter.acquire().await?;
        self.signals.ensure_clear()?;
        write_payload(&mut *link, &set.query_payload(), &self.log)?;

        let mut pending: Vec<&ConfigEntry> = set.entries().iter().collect();
        let mut mismatches = Vec::new();
        let mut assembler = LineAssembler::new();
        let started = Instant::now();

        while !pending.is_empty() {
            self.signals.ensure_clear()?;
            if let Some(limit) = self.policy.verify_timeout {
                if started.elapsed() >= limit {
                    return Err(ConfigError::VerifyTimeout {
                        pending: pending.iter().map(|e| e.key.clone()).collect(),
                        timeout_ms: limit.as_millis() as u64,
                    }
                    .into());
                }
            }

            tokio::time::sleep(self.policy.query_interval).await;

            let lines = drain_channel(&mut *link, &mut assembler, &self.signals, &self.log)?;
            for response in lines.iter().filter_map(|line| line.response()) {
                for (key, actual) in response.settings() {
                    let Some(pos) = pending.iter().position(|e| e.key == key) else {
                        continue;
                    };
                    let entry = pending.remove(pos);
                    if actual != entry.expected {
                        tracing::info!(
                            "Setting '{}' is {}, expected {}",
                            entry.key,
                            actual,
                            entry.expected
                        );
                        mismatches.push(ConfigMismatch {
                            key: entry.key.clone(),
                            expected: entry.expected,
                            actual,
                            line: entry.line.clone(),
                        });
                    }
                }
            }
        }

        mismatches.sort_by_key(|m| {
            set.entries()
                .iter()
                .position(|e| e.key == m.key)
                .unwrap_or(usize::MAX)
        });
        Ok(mismatches)
    }

    /// Rewrite every mismatched setting, one send per line
    pub async fn correct(&self, mismatches: &[ConfigMismatch]) -> Result<()> {
        for mismatch in mismatches {
            tracing::info!("Correcting '{}' to {}", mismatch.key, mismatch.expected);
            self.sender.send(&mismatch.line).await?;
        }
        Ok(())
    }

    /// Write lines of the set to the controller
    ///
    /// `selection` holds entry indices; `None` writes the whole set.
    pub async fn apply(&self, set: &ConfigSet, selection: Option<&[usize]>) -> Result<()> {
        for (index, entry) in set.entries().iter().enumerate() {
            if selection.map_or(true, |chosen| chosen.contains(&index)) {
                self.sender.send(&entry.line).await?;
            }
        }
        Ok(())
    }

    /// Verify and correct until the controller matches the set
    pub async fn synchronize(&self, set: &ConfigSet) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut rounds = 0u32;

        loop {
            let mismatches = self.verify(set).await?;
            report.verify_passes += 1;

            if mismatches.is_empty() {
                tracing::info!(
                    "Controller config in sync after {} verify pass(es)",
                    report.verify_passes
                );
                return Ok(report);
            }

            if let Some(limit) = self.policy.max_correction_rounds {
                if rounds >= limit {
                    return Err(ConfigError::NotConverged {
                        rounds,
                        keys: mismatches.into_iter().map(|m| m.key).collect(),
                    }
                    .into());
                }
            }

            self.correct(&mismatches).await?;
            report
                .corrected
                .extend(mismatches.into_iter().map(|m| m.key));
            rounds += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_set() {
        let set = ConfigSet::parse("{\"XVM\":1000}\n\n{\"yvm\":1000.5}\r\n").unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.entries()[0].key, "xvm");
        assert_eq!(set.entries()[0].line, "{\"XVM\":1000}");
        assert_eq!(set.get("YVM").unwrap().expected, 1000.5);
    }

    #[test]
    fn test_query_payload_replaces_values() {
        let set = ConfigSet::parse("{\"xvm\":1000}\n{\"ej\":1}").unwrap();
        assert_eq!(set.query_payload(), "{\"xvm\":n}\n{\"ej\":n}");
    }

    #[test]
    fn test_invalid_lines_report_line_number() {
        let err = ConfigSet::parse("{\"xvm\":1000}\n{\"yvm\":\"fast\"}").unwrap_err();
        assert!(matches!(
            err,
            tinyg_link_core::Error::Config(ConfigError::InvalidLine { line_number: 2, .. })
        ));

        let err = ConfigSet::parse("{\"xvm\":1000}\n{\"gc\":\"G0\"}").unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("line 2"));

        assert!(ConfigSet::parse("{\"a\":1,\"b\":2}").is_err());
        assert!(ConfigSet::parse("[1,2]").is_err());
        assert!(ConfigSet::parse("xvm=1000").is_err());
    }

    #[test]
    fn test_repeated_key_keeps_last_value() {
        let set = ConfigSet::parse("{\"xvm\":500}\n{\"XVM\":1000}").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.entries()[0].expected, 1000.0);
    }

    #[test]
    fn test_from_pairs_builds_setting_lines() {
        let set = ConfigSet::from_pairs([("XVM", 1000.0), ("yvm", 12.5)]);
        assert_eq!(set.entries()[0].line, "{\"xvm\":1000}");
        assert_eq!(set.entries()[1].line, "{\"yvm\":12.5}");
    }

    #[test]
    fn test_quoted_key_stays_one_key_on_the_wire() {
        let set = ConfigSet::parse(r#"{"a\"b":3}"#).unwrap();
        assert_eq!(set.query_payload(), r#"{"a\"b":n}"#);

        let set = ConfigSet::from_pairs([("a\"b", 3.0)]);
        let line: Value = serde_json::from_str(&set.entries()[0].line).unwrap();
        assert_eq!(line.as_object().map(|o| o.len()), Some(1));
        assert_eq!(line["a\"b"], 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ConfigSet::load(Path::new("/nonexistent/tinyg_basic_config.json")).unwrap_err();
        assert!(err.is_config_error());
    }
}
