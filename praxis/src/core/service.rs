use super::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Service,
    Object,
    Workflow,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Service => "service",
            ServiceKind::Object => "object",
            ServiceKind::Workflow => "workflow",
        }
    }
}

impl FromStr for ServiceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "service" => Ok(ServiceKind::Service),
            "object" => Ok(ServiceKind::Object),
            "workflow" => Ok(ServiceKind::Workflow),
            _ => Err(CoreError::InvalidServiceKind(s.to_string())),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concurrency class of a handler on a keyed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    Exclusive,
    Shared,
    Workflow,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Exclusive => "exclusive",
            HandlerKind::Shared => "shared",
            HandlerKind::Workflow => "workflow",
        }
    }
}

impl FromStr for HandlerKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exclusive" => Ok(HandlerKind::Exclusive),
            "shared" => Ok(HandlerKind::Shared),
            "workflow" => Ok(HandlerKind::Workflow),
            _ => Err(CoreError::InvalidHandlerKind(s.to_string())),
        }
    }
}

/// Identifies the service a handler belongs to.
///
/// Immutable once built; handlers hold their own copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceTag {
    kind: ServiceKind,
    name: String,
}

impl ServiceTag {
    pub fn new(kind: ServiceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::new(ServiceKind::Service, name)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(ServiceKind::Object, name)
    }

    pub fn workflow(name: impl Into<String>) -> Self {
        Self::new(ServiceKind::Workflow, name)
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}
