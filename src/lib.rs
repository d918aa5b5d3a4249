//! apiprobe - declarative integration testing for network APIs
//!
//! Suites are YAML files describing requests and the shape of their
//! expected responses. The runner issues each request over REST, RPC, or
//! WebSocket, normalizes the response into a generic value tree, and
//! validates it against a schema of matchers. A per-suite store carries
//! values captured from earlier responses into later requests.

pub mod common;
pub mod matcher;
pub mod report;
pub mod runner;
pub mod store;
pub mod template;
pub mod transport;
pub mod value;

// Re-export the types embedders and tests reach for most
pub use common::{Error, Result};
pub use matcher::{MatcherPath, ResponseMatcher};
pub use runner::{MultiSuiteResult, SuiteResult, TestSuite};
pub use store::DataStore;
pub use value::Value;
