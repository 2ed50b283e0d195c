//! Operator-editable watch list and the actor that owns it.

pub mod actor;
pub mod settings;
pub mod store;

pub use actor::{spawn_config_actor, ConfigHandle, Mutation, Stamping};
pub use settings::{
    normalize_symbol, Settings, WalletAddress, MAX_POLL_SECONDS, MIN_CONSENSUS, MIN_POLL_SECONDS,
};
pub use store::{load_or_default, ConfigStore, JsonFileStore, MemoryStore, StateDocument};
