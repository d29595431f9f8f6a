use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a submitted task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new unique task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Namespace for credential fingerprints
const CREDENTIAL_NAMESPACE: Uuid = Uuid::from_u128(0x6a2f_0c1e_8d4b_4f57_9b3a_51c2_e07d_94a1);

/// Routing key selecting which shard a task lands on.
///
/// Keys built from credentials only ever hold a fingerprint, never the
/// secret itself, so they are safe to log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchKey(String);

impl DispatchKey {
    pub const SHARED: &'static str = "shared";

    /// Key for callers without a personal credential
    pub fn shared() -> Self {
        Self(Self::SHARED.to_string())
    }

    /// Key from an already computed fingerprint or label
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Fingerprint a backend credential
    pub fn from_credential(secret: &str) -> Self {
        let fingerprint = Uuid::new_v5(&CREDENTIAL_NAMESPACE, secret.as_bytes());
        Self(format!("cred-{}", fingerprint.simple()))
    }

    /// Personal key when a credential is present, shared key otherwise
    pub fn for_credential(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) if !secret.is_empty() => Self::from_credential(secret),
            _ => Self::shared(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DispatchKey {
    fn default() -> Self {
        Self::shared()
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_fingerprint_is_stable() {
        let a = DispatchKey::from_credential("secret-token");
        let b = DispatchKey::from_credential("secret-token");
        let c = DispatchKey::from_credential("other-token");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.as_str().contains("secret-token"));
    }

    #[test]
    fn test_missing_credential_uses_shared_key() {
        assert_eq!(DispatchKey::for_credential(None), DispatchKey::shared());
        assert_eq!(DispatchKey::for_credential(Some("")), DispatchKey::shared());
        assert_eq!(
            DispatchKey::for_credential(Some("token")),
            DispatchKey::from_credential("token")
        );
        assert_eq!(DispatchKey::default(), DispatchKey::shared());
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }
}
