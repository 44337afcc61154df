use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::config::{AssistantConfig, Gender};

const SESSION_ID_KEY: &str = "session_id";

/// Key-value persistence for session state
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-process store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}

/// Who the assistant is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub gender: Gender,
}

impl Persona {
    /// Voice id for the speech synthesis backend
    pub fn voice(&self) -> &'static str {
        match self.gender {
            Gender::Female => "nova",
            Gender::Male => "onyx",
        }
    }

    /// Opening line for the given local hour (0-23)
    pub fn greeting_for_hour(&self, hour: u32) -> String {
        let salutation = match hour {
            5..=11 => "Góðan daginn",
            12..=17 => "Góðan dag",
            _ => "Gott kvöld",
        };
        format!(
            "{}, ég heiti {} og er aðstoðarmaður Reykjavíkurborgar. Hvernig get ég aðstoðað þig?",
            salutation, self.name
        )
    }
}

impl From<&AssistantConfig> for Persona {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            name: config.name.clone(),
            gender: config.gender,
        }
    }
}

/// Per-session state that outlives single turns
pub struct SessionContext {
    store: Arc<dyn KeyValueStore>,
    session_id: String,
    persona: Persona,
    user_has_greeted: bool,
    initial_greeting_done: bool,
}

impl SessionContext {
    /// Load the persisted session id or create a new one
    pub fn init(store: Arc<dyn KeyValueStore>, persona: Persona) -> Self {
        let session_id = match store.get(SESSION_ID_KEY) {
            Some(id) => {
                info!("Resuming session {}", id);
                id
            }
            None => {
                let id = new_session_id();
                store.set(SESSION_ID_KEY, &id);
                info!("Created session {}", id);
                id
            }
        };

        Self {
            store,
            session_id,
            persona,
            user_has_greeted: false,
            initial_greeting_done: false,
        }
    }

    /// Forget the current session and start a fresh one
    pub fn reset(&mut self) {
        warn!("Resetting session {}", self.session_id);
        self.store.remove(SESSION_ID_KEY);
        self.session_id = new_session_id();
        self.store.set(SESSION_ID_KEY, &self.session_id);
        self.user_has_greeted = false;
        self.initial_greeting_done = false;
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn user_has_greeted(&self) -> bool {
        self.user_has_greeted
    }

    pub fn mark_user_greeted(&mut self) {
        self.user_has_greeted = true;
    }

    pub fn initial_greeting_done(&self) -> bool {
        self.initial_greeting_done
    }

    pub fn mark_initial_greeting_done(&mut self) {
        self.initial_greeting_done = true;
    }
}

fn new_session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4())
}
