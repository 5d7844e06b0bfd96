// SQLite backend - the begin/execute/commit protocol over local database files
//
// - client: StatementClient implementation; one file per database under a cluster directory
// - admin: cluster-level statements (terminate, drop, create database)
// - params: parameter conversion between RowValues and rusqlite values
// - query: result extraction and building

mod admin;
pub mod client;
pub mod params;
pub mod query;

pub use client::SqliteStatementClient;
pub use params::Params;
pub use query::build_result_set;
