//! # quipu-store
//!
//! SQLite-backed persistence for Quipu: the task/order repository and the
//! per-user dialogue state (conversation context, pending confirmations,
//! pagination cursors).

pub mod store;

pub use store::dialogue::{
    ConfirmationKind, ConversationContext, PaginationCursor, PendingConfirmation,
};
pub use store::Store;
