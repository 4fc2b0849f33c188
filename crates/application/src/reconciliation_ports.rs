mod bank_feed;
mod ledger;
mod review_queue;
mod watermark;

pub use bank_feed::{BankFeed, TransactionBatch};
pub use ledger::{MatchClassification, ProcessedTransaction, TransactionLedger};
pub use review_queue::{ReviewItem, ReviewQueue, ReviewStatus};
pub use watermark::{Watermark, WatermarkStore};
