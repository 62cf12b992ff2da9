use serde::{Deserialize, Serialize};

/// Everything the engine knows about the invocation being executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    invocation_id: String,
    random_seed: u64,
    headers: Vec<(String, String)>,
    input_buffer: Vec<u8>,
    key: String,
}

impl Invocation {
    pub fn new(
        invocation_id: impl Into<String>,
        random_seed: u64,
        headers: Vec<(String, String)>,
        input_buffer: Vec<u8>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            random_seed,
            headers,
            input_buffer,
            key: key.into(),
        }
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a request header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn input_buffer(&self) -> &[u8] {
        &self.input_buffer
    }

    /// Key of the virtual object or workflow; empty for plain services.
    pub fn key(&self) -> &str {
        &self.key
    }
}
