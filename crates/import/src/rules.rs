use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::observer::Observer;

/// How a payee is recognised in the candidate texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Case-insensitive prefix.
    Literal(String),
    /// Case-insensitive prefixes, tried in order.
    LiteralSet(Vec<String>),
    /// Case-sensitive pattern matched at the start of a candidate.
    Regex(String),
}

impl Rule {
    /// Reads one value of a rule file. Accepted shapes:
    ///
    /// ```toml
    /// Amazon = "amazon"
    /// Rail = { values = ["DB Vertrieb", "DB Fernverkehr"] }
    /// Netflix = { regex = true, value = "NETFLIX\\.COM" }
    /// ```
    pub fn from_value(label: &str, value: &toml::Value) -> Result<Self, RuleError> {
        let invalid = |reason: &str| RuleError::InvalidRule {
            label: label.to_string(),
            reason: reason.to_string(),
        };

        let table = match value {
            toml::Value::String(prefix) => return Ok(Rule::Literal(prefix.clone())),
            toml::Value::Table(table) => table,
            _ => return Err(invalid("expected a string or a table")),
        };

        if let Some(values) = table.get("values") {
            let values = values
                .as_array()
                .ok_or_else(|| invalid("`values` must be an array of strings"))?;
            let prefixes = values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("`values` must be an array of strings"))?;
            return Ok(Rule::LiteralSet(prefixes));
        }

        let value = table
            .get("value")
            .and_then(toml::Value::as_str)
            .ok_or_else(|| invalid("missing string `value` or array `values`"))?;
        let is_regex = match table.get("regex") {
            None => false,
            Some(flag) => flag
                .as_bool()
                .ok_or_else(|| invalid("`regex` must be a boolean"))?,
        };

        if is_regex {
            Ok(Rule::Regex(value.to_string()))
        } else {
            Ok(Rule::Literal(value.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    pub label: String,
    pub rule: Rule,
}

impl RuleEntry {
    pub fn new(label: impl Into<String>, rule: Rule) -> Self {
        Self { label: label.into(), rule }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule configuration missing: {0}")]
    ConfigurationMissing(String),
    #[error("Failed to parse rule file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid rule for payee '{label}': {reason}")]
    InvalidRule { label: String, reason: String },
}

/// A rule could not be evaluated against a candidate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Rule for payee '{label}' has an invalid pattern '{pattern}': {reason}")]
pub struct MatchEvaluationError {
    pub label: String,
    pub pattern: String,
    pub reason: String,
}

// ── Rule sets (one per file) ──────────────────────────────────────────────────

/// The rules of one rule file, in declaration order, one entry per label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    entries: Vec<RuleEntry>,
}

impl RuleSet {
    /// A repeated label keeps its first position and takes the last rule.
    pub fn new(entries: impl IntoIterator<Item = RuleEntry>) -> Self {
        let mut set = RuleSet::default();
        let mut index: HashMap<String, usize> = HashMap::new();
        for entry in entries {
            match index.get(&entry.label) {
                Some(&pos) => set.entries[pos].rule = entry.rule,
                None => {
                    index.insert(entry.label.clone(), set.entries.len());
                    set.entries.push(entry);
                }
            }
        }
        set
    }

    pub fn from_table(table: &toml::Table) -> Result<Self, RuleError> {
        let entries = table
            .iter()
            .map(|(label, value)| -> Result<RuleEntry, RuleError> {
                Ok(RuleEntry::new(label.clone(), Rule::from_value(label, value)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entries))
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, RuleError> {
        let table: toml::Table = toml::from_str(toml_content)?;
        Self::from_table(&table)
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Rule store (effective rules for a run) ────────────────────────────────────

/// One rule of the store, with its match data prepared once.
#[derive(Debug)]
pub struct StoreEntry {
    entry: RuleEntry,
    /// Lowercased prefixes for `Literal`/`LiteralSet`; empty for `Regex`.
    prefixes: Vec<String>,
    /// Compiled on first use.
    compiled: OnceLock<Result<Regex, String>>,
}

impl StoreEntry {
    fn new(entry: RuleEntry) -> Self {
        let prefixes = match &entry.rule {
            Rule::Literal(prefix) => vec![prefix.to_lowercase()],
            Rule::LiteralSet(prefixes) => prefixes.iter().map(|p| p.to_lowercase()).collect(),
            Rule::Regex(_) => Vec::new(),
        };
        Self { entry, prefixes, compiled: OnceLock::new() }
    }

    pub fn label(&self) -> &str {
        &self.entry.label
    }

    pub fn rule(&self) -> &Rule {
        &self.entry.rule
    }

    /// `lowered` holds the lowercased candidates.
    pub(crate) fn starts_any(&self, lowered: &[String]) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| lowered.iter().any(|c| c.starts_with(prefix.as_str())))
    }

    pub(crate) fn contains_any(&self, lowered: &[String]) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| lowered.iter().any(|c| c.contains(prefix.as_str())))
    }

    /// True when the pattern matches at the start of any candidate. A pattern
    /// that fails to compile never matches and is reported once.
    pub(crate) fn pattern_matches_any(&self, candidates: &[String], observer: &dyn Observer) -> bool {
        let Rule::Regex(pattern) = &self.entry.rule else {
            return false;
        };

        let mut first_attempt = false;
        let compiled = self.compiled.get_or_init(|| {
            first_attempt = true;
            Regex::new(pattern).map_err(|e| e.to_string())
        });

        match compiled {
            // The leftmost match starts at 0 whenever any match does.
            Ok(re) => candidates
                .iter()
                .any(|c| re.find(c).is_some_and(|m| m.start() == 0)),
            Err(reason) => {
                if first_attempt {
                    observer.rule_failed(&MatchEvaluationError {
                        label: self.entry.label.clone(),
                        pattern: pattern.clone(),
                        reason: reason.clone(),
                    });
                }
                false
            }
        }
    }
}

/// Ordered payee rules in effect for one run. Labels are unique and the order
/// decides which rule wins when several match.
#[derive(Debug, Default)]
pub struct RuleStore {
    entries: Vec<StoreEntry>,
    index: HashMap<String, usize>,
}

impl RuleStore {
    /// Override rules come first in their own order, followed by every base
    /// rule whose label the overrides do not already define.
    pub fn build(base: Option<RuleSet>, overrides: Option<RuleSet>) -> Result<Self, RuleError> {
        let base = base
            .ok_or_else(|| RuleError::ConfigurationMissing("no base rule set".to_string()))?;

        let mut store = RuleStore::default();
        let merged = overrides
            .into_iter()
            .flat_map(|set| set.entries)
            .chain(base.entries);
        for entry in merged {
            if store.index.contains_key(&entry.label) {
                continue;
            }
            store.index.insert(entry.label.clone(), store.entries.len());
            store.entries.push(StoreEntry::new(entry));
        }
        Ok(store)
    }

    pub fn get(&self, label: &str) -> Option<&Rule> {
        self.index.get(label).map(|&pos| self.entries[pos].rule())
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreEntry> {
        self.entries.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(StoreEntry::label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
