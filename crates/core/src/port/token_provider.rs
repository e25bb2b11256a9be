// Claim Token Provider Port
//
// The queue treats claim tokens as opaque; this port gives workers a
// standard way to mint one per claim attempt (and tests a way to make
// them deterministic).

/// Token provider interface
pub trait TokenProvider: Send + Sync {
    /// Generate a new opaque claim token
    fn generate_token(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidTokenProvider;

impl TokenProvider for UuidTokenProvider {
    fn generate_token(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
