pub mod engine;
pub mod memory;
pub mod notify;
pub mod persistence;

pub use engine::IdentityStore;
pub use memory::{FieldKind, InMemoryStore};
pub use notify::{NotificationHub, PropChange, SubscriberId, Subscription};
pub use persistence::{
    ListSnapshot, ListStateStore, PersistKey, PersistedList, decode_frame, encode_list,
    read_header, restore_list,
};
