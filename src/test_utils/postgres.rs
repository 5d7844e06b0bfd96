use postgresql_embedded::PostgreSQL;

use crate::endpoint::EndpointIdentity;

/// A running throwaway server. Stop it with [`EmbeddedPostgres::stop`].
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    resource: String,
    password: String,
}

impl EmbeddedPostgres {
    /// libpq-style connection string (`host=.. port=.. user=..`) for the server.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// `database` on this server, authenticated as the bootstrap superuser.
    #[must_use]
    pub fn endpoint(&self, database: &str) -> EndpointIdentity {
        EndpointIdentity::new(&self.resource, &self.password, database)
    }

    pub async fn stop(self) {
        let _ = self.postgresql.stop().await;
    }
}

/// Install (from the bundled archive) and start a server on a free port.
///
/// Only the maintenance database `postgres` exists afterwards; tests create
/// their own through the admin statements.
///
/// # Errors
/// Returns an error if the server cannot be set up or started.
pub async fn setup_postgres_embedded() -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let mut postgresql = PostgreSQL::default();
    postgresql.setup().await?;
    postgresql.start().await?;

    let settings = postgresql.settings();
    let port = settings.port;
    let resource = format!(
        "host={} port={port} user={}",
        settings.host, settings.username
    );
    let password = settings.password.clone();
    tracing::info!(port, "embedded postgres started");

    Ok(EmbeddedPostgres {
        postgresql,
        port,
        resource,
        password,
    })
}
