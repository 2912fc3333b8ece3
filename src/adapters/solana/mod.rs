pub mod logs_feed;
pub mod rpc;
pub mod wallet;

pub use logs_feed::{LogsFeed, LogsFeedConfig};
pub use rpc::SolanaClient;
pub use wallet::{WalletError, WalletManager};
