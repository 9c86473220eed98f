pub mod block;
pub mod transaction;
pub mod validator;

pub use block::Block;
pub use transaction::{Transaction, TransactionType};
pub use validator::ValidatingLedger;
