//! Template expansion
//!
//! Two region syntaxes compose over any value tree: `@{path}` variable
//! references resolved against the suite data store (see
//! [`crate::store::DataStore::expand_variable`]) and `$(argv…)` subcommand
//! regions executed through [`command::execute_commands`]. Both use the
//! same nested-region parser in [`tokens`].

pub mod command;
pub mod tokens;
