/*!
# Uptime DevKit - Stubs and fixtures for development

Helpers for running the kernel without a real upstream:
- Scriptable stub of the upstream node-list endpoint
- Builders for node batches
- Test logging setup
*/

pub mod source_stub;
pub mod test_utils;

pub use source_stub::StubSource;
pub use test_utils::{init_test_logging, NodeBatch, StubNode};
