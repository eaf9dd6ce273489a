//! redb table definitions for the embedded state store.
//!
//! Keys are the full '/'-delimited record paths, so a lexicographic range
//! scan starting at a prefix visits exactly the keys under that prefix.

use redb::TableDefinition;

/// Problem records keyed by `{prefix}/{class}/{dc}/{node}/{check}[/{service}]`,
/// valued by the check output captured at detection time.
pub const PROBLEMS: TableDefinition<&str, &[u8]> = TableDefinition::new("problems");
