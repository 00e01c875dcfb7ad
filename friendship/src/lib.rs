//! Friendship relationships between users: the shared model and wire schemas,
//! the relationship state machine, and a client-side store that keeps a
//! user's friendship views in sync with the friendship service.

pub mod api;
pub mod cache;
pub mod error;
pub mod model;
pub mod pagination;
pub mod store;
pub mod transition;
pub mod wire;

pub use api::{FriendshipApi, HttpFriendshipApi};
pub use cache::KeyedCache;
pub use error::{Error, ErrorInfo, Result, ValidationError};
pub use model::{
    Direction, Friendship, FriendshipStatus, FriendshipView, RelationStatus, StatusEntry, Tier,
    TierKind, UserProfile,
};
pub use pagination::{PageRequest, Paginated, Pagination};
pub use store::{Bucket, FriendshipStore, LoadStatus, StoreConfig};
pub use transition::{Action, RelationState, TransitionError};
