//! Per-execution knobs: cache mode (§4.7), source-state validation mode
//! (§4.7), the output row limit (§4.8 step 6), and whether folding is
//! attempted at all (§4.6).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Look up and store as usual.
    Normal,
    /// Skip the lookup, but still populate the cache on completion.
    Bypass,
    /// Skip the lookup and force a fresh execution, same as `Bypass` from
    /// the engine's point of view; the distinction exists for callers that
    /// want to log "user requested a refresh" versus "cache is off".
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// A hit is honored until its TTL expires, full stop.
    None,
    /// A hit additionally gets its source(s) probed via
    /// `Connector::get_source_state` before being trusted (§4.7).
    SourceState,
}

#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub limit: Option<usize>,
    pub cache_mode: CacheMode,
    pub validation_mode: ValidationMode,
    pub fold: bool,
    pub privacy_mode: String,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            limit: None,
            cache_mode: CacheMode::Normal,
            validation_mode: ValidationMode::SourceState,
            fold: true,
            privacy_mode: "default".to_string(),
        }
    }
}
