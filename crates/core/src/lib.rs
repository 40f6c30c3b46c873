pub mod money;
pub mod transaction;

pub use money::Money;
pub use transaction::{CanonicalTransaction, LEDGER_DATE_FORMAT};
