use std::sync::Arc;

use thiserror::Error;

use crate::observer::{Observer, TracingObserver};
use crate::rules::RuleStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// The texts of one transaction that may name its counterparty, most
/// trustworthy first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSources(Vec<String>);

impl CandidateSources {
    pub fn new<I, S>(sources: I) -> Result<Self, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        if sources.is_empty() {
            return Err(ResolveError::InvalidArgument("candidate sources must not be empty"));
        }
        Ok(Self(sources))
    }

    /// Infallible form for adapters that always have a primary candidate.
    pub fn from_parts(first: impl Into<String>, rest: impl IntoIterator<Item = String>) -> Self {
        let mut sources = vec![first.into()];
        sources.extend(rest);
        Self(sources)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// First non-empty candidate, or the first candidate when all are empty.
    pub fn fallback(&self) -> &str {
        self.0
            .iter()
            .find(|s| !s.is_empty())
            .unwrap_or(&self.0[0])
    }
}

/// Which scan over the rule store produced the payee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    /// A candidate starts with the rule's prefix, or the rule's pattern
    /// matches at the start of a candidate.
    Prefix,
    /// A candidate contains the rule's prefix somewhere.
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub payee: String,
    /// `None` when no rule matched and the payee is a raw candidate.
    pub matched: Option<MatchPass>,
}

/// Resolves clean payee labels from candidate texts using a rule store.
///
/// Every call makes two full passes over the store in order: a prefix pass
/// (literal prefixes and start-anchored patterns), then a containment pass
/// over literal rules only. A strict hit on a late rule therefore beats a
/// loose hit on an early one. The first matching rule wins regardless of
/// which candidate matched it.
pub struct PayeeResolver {
    store: RuleStore,
    observer: Arc<dyn Observer>,
}

impl PayeeResolver {
    pub fn new(store: RuleStore, observer: Arc<dyn Observer>) -> Self {
        Self { store, observer }
    }

    /// Resolver reporting to `tracing`.
    pub fn with_tracing(store: RuleStore) -> Self {
        Self::new(store, Arc::new(TracingObserver))
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn observer(&self) -> &dyn Observer {
        self.observer.as_ref()
    }

    pub fn resolve(&self, sources: &CandidateSources) -> String {
        self.resolve_with_rule(sources).payee
    }

    pub fn resolve_with_rule(&self, sources: &CandidateSources) -> Resolution {
        let candidates = sources.as_slice();
        let lowered: Vec<String> = candidates.iter().map(|c| c.to_lowercase()).collect();
        let observer = self.observer.as_ref();

        let prefix_hit = self.store.iter().find(|entry| {
            entry.starts_any(&lowered) || entry.pattern_matches_any(candidates, observer)
        });
        if let Some(entry) = prefix_hit {
            return Resolution {
                payee: entry.label().to_string(),
                matched: Some(MatchPass::Prefix),
            };
        }

        if let Some(entry) = self.store.iter().find(|entry| entry.contains_any(&lowered)) {
            return Resolution {
                payee: entry.label().to_string(),
                matched: Some(MatchPass::Contains),
            };
        }

        let payee = sources.fallback().to_string();
        observer.payee_fallback(candidates, &payee);
        Resolution { payee, matched: None }
    }
}
