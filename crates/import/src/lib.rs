pub mod adapter;
pub mod camt;
pub mod export;
pub mod feed;
pub mod observer;
pub mod resolver;
pub mod rules;
pub(crate) mod util;
pub mod xml;

pub use adapter::SourceAdapter;
pub use camt::{
    read_archive, try_parse_statement, CamtAdapter, CamtError, CreditDebit, StatementDocument,
    StatementEntry,
};
pub use export::{export_file, write_ledger, ExportError};
pub use feed::{parse_records, FeedAdapter, FeedError, FeedRecord};
pub use observer::{Observer, TracingObserver};
pub use resolver::{CandidateSources, MatchPass, PayeeResolver, ResolveError, Resolution};
pub use rules::{MatchEvaluationError, Rule, RuleEntry, RuleError, RuleSet, RuleStore};
