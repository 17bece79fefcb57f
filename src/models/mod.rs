pub mod account;
pub mod limit;
pub mod transaction;

pub use account::AccountSnapshot;
pub use limit::{AccountTier, TransactionLimit};
pub use transaction::{Transaction, TransactionKind, TransactionStatus, EXTERNAL_ACCOUNT};
