mod state;
mod store;

pub use self::state::{PersistedState, PersistedZone};
pub use self::store::{PersistenceError, StateStore};
