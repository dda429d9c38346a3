//! Session state in a single pretty-printed JSON file, keyed by strategy.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::error::TraderError;
use crate::domain::session::SessionState;
use crate::ports::state_port::StatePort;

pub const DEFAULT_STATE_PATH: &str = "trading_state.json";

pub struct JsonStateFile {
    path: PathBuf,
}

impl JsonStateFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonStateFile {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state_error(&self, what: &str, e: impl std::fmt::Display) -> TraderError {
        TraderError::State {
            reason: format!("{what} {}: {e}", self.path.display()),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, SessionState>, TraderError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.state_error("cannot read", e)),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| self.state_error("corrupt state file", e))
    }

    /// Write to a sibling temp file, then rename over the real one.
    ///
    /// serde_json writes non-finite floats as `null`, which would not load
    /// back; such state is refused and the existing file is left alone.
    fn write_all(&self, states: &BTreeMap<String, SessionState>) -> Result<(), TraderError> {
        let json = serde_json::to_string_pretty(states)
            .map_err(|e| self.state_error("cannot serialize state for", e))?;
        serde_json::from_str::<BTreeMap<String, SessionState>>(&json)
            .map_err(|e| self.state_error("refusing non-finite values in state for", e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(|e| self.state_error("cannot write", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.state_error("cannot replace", e))
    }
}

impl StatePort for JsonStateFile {
    fn save(&self, state: &SessionState) -> Result<(), TraderError> {
        let mut states = self.read_all()?;
        states.insert(state.strategy.clone(), state.clone());
        self.write_all(&states)
    }

    fn load(&self, strategy: &str) -> Result<Option<SessionState>, TraderError> {
        Ok(self.read_all()?.remove(strategy))
    }

    fn load_all(&self) -> Result<BTreeMap<String, SessionState>, TraderError> {
        self.read_all()
    }

    fn clear(&self, strategy: Option<&str>) -> Result<(), TraderError> {
        let states = match strategy {
            Some(key) => {
                let mut states = self.read_all()?;
                states.remove(key);
                states
            }
            None => BTreeMap::new(),
        };
        self.write_all(&states)
    }
}
