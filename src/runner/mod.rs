//! Suite loading and scheduling

pub mod case;
pub mod multi;
pub mod suite;

pub use case::{CaseResult, TestCase, TestCaseCfg};
pub use multi::{discover_suites, run_suites, MultiSuiteResult};
pub use suite::{SuiteResult, TestSuite};
