use bomberlan::SessionConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    /// Fixed board seed; a fresh board each run when unset.
    pub seed: Option<u64>,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            seed: None,
            session: SessionConfig::default(),
        }
    }
}
