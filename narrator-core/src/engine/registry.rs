use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::azure::AzureEngine;
use super::elevenlabs::ElevenLabsEngine;
use super::espeak::EspeakEngine;
use super::provider::SharedEngine;

/// Engine name to implementation. Adding an engine means registering it here
/// (or on a caller-built registry), never editing the dispatcher.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, SharedEngine>,
}

impl EngineRegistry {
    pub fn new(engines: Vec<SharedEngine>) -> Self {
        let mut registry = Self::default();
        for engine in engines {
            registry.register(engine);
        }
        registry
    }

    /// The bundled engines: `espeak`, `azure` and `elevenlabs`.
    pub fn with_default_engines() -> Self {
        Self::new(vec![
            Arc::new(EspeakEngine::new()),
            Arc::new(AzureEngine::new()),
            Arc::new(ElevenLabsEngine::new()),
        ])
    }

    pub fn register(&mut self, engine: SharedEngine) {
        let name = engine.name().to_string();
        debug!(engine = %name, "Registering engine");
        self.engines.insert(name, engine);
    }

    pub fn get(&self, name: &str) -> Option<SharedEngine> {
        self.engines.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.engines.keys().cloned().collect()
    }
}
