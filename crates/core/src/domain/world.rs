use serde::{Deserialize, Serialize};

/// Ambient state injected into resolver prompts. Read-only to the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldContext {
    pub online: Vec<String>,
    pub weather: Option<String>,
    pub time_of_day: Option<String>,
}

impl WorldContext {
    pub fn describe(&self) -> String {
        let online = if self.online.is_empty() { "nobody".to_string() } else { self.online.join(", ") };
        format!(
            "online: {online}; weather: {}; time: {}",
            self.weather.as_deref().unwrap_or("unknown"),
            self.time_of_day.as_deref().unwrap_or("unknown")
        )
    }
}

pub trait WorldContextProvider: Send + Sync {
    fn snapshot(&self) -> WorldContext;
}

/// Fixed context for tools and tests that have no live server.
#[derive(Clone, Debug, Default)]
pub struct StaticWorld(pub WorldContext);

impl WorldContextProvider for StaticWorld {
    fn snapshot(&self) -> WorldContext {
        self.0.clone()
    }
}
