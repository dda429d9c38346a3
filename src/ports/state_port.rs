//! Session state persistence port trait.

use crate::domain::error::TraderError;
use crate::domain::session::SessionState;
use std::collections::BTreeMap;

/// Stores the latest [`SessionState`] per strategy key.
pub trait StatePort {
    fn save(&self, state: &SessionState) -> Result<(), TraderError>;

    fn load(&self, strategy: &str) -> Result<Option<SessionState>, TraderError>;

    fn load_all(&self) -> Result<BTreeMap<String, SessionState>, TraderError>;

    /// Remove one strategy's state, or everything when `strategy` is `None`.
    fn clear(&self, strategy: Option<&str>) -> Result<(), TraderError>;
}
