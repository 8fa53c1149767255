pub mod chat;
pub mod connection;
pub mod conversation;
pub mod diff;
pub mod leaderboard;
pub mod ranking;
pub mod retention;
pub mod store;
pub mod subscription;

pub use chat::ChatService;
pub use connection::{FeedServices, handle_connection};
pub use conversation::{ConversationStrategy, ConversationView};
pub use leaderboard::LeaderboardService;
pub use ranking::{ModeFilter, rank};
pub use retention::{RetentionManager, RetentionTask, TrimReport};
pub use store::{ChangeKind, EventStore, StoreChange};
pub use subscription::{CancelHandle, Subscription, SubscriptionService, Window};

/// Window size used when a caller does not ask for one.
pub const DEFAULT_WINDOW: u32 = 50;
