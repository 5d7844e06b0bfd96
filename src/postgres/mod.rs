// PostgreSQL backend - drives the begin/execute/commit protocol over the Postgres wire protocol
//
// - client: StatementClient implementation and connection handling
// - params: parameter conversion between RowValues and PostgreSQL types
// - query: result extraction and building

pub mod client;
pub mod params;
pub mod query;

pub use client::PostgresStatementClient;
pub use params::Params;
pub use query::build_result_set;
