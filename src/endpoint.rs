use std::fmt;

use serde::Serialize;

/// Opaque handles naming a remote database connection.
///
/// Immutable once built; derive a sibling identity for another database on the
/// same cluster with [`EndpointIdentity::with_database`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EndpointIdentity {
    resource: String,
    credential: String,
    database: String,
}

impl EndpointIdentity {
    #[must_use]
    pub fn new(
        resource: impl Into<String>,
        credential: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            credential: credential.into(),
            database: database.into(),
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn credential(&self) -> &str {
        &self.credential
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Same cluster and credential, different database.
    #[must_use]
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            resource: self.resource.clone(),
            credential: self.credential.clone(),
            database: database.into(),
        }
    }
}

// The credential never reaches logs.
impl fmt::Debug for EndpointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointIdentity")
            .field("resource", &self.resource)
            .field("credential", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Opaque token scoping statements to one remote transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TransactionHandle(String);

impl TransactionHandle {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random handle, as issued by the local backends.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
