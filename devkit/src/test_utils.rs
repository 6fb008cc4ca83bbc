/*!
Fixtures for tests that drive the kernel through its upstream
*/

use serde::{Deserialize, Serialize};

/// One entry of the upstream node list, in its wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubNode {
    pub key: String,
    /// Seconds since the node's process started.
    pub start_time: u64,
}

impl StubNode {
    pub fn new(key: impl Into<String>, uptime_secs: u64) -> Self {
        Self { key: key.into(), start_time: uptime_secs }
    }
}

/// Builder for a node list, in insertion order.
#[derive(Debug, Default)]
pub struct NodeBatch {
    nodes: Vec<StubNode>,
}

impl NodeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, key: &str, uptime_secs: u64) -> Self {
        self.nodes.push(StubNode::new(key, uptime_secs));
        self
    }

    /// Advances every counter by `secs`, as if the nodes kept running.
    pub fn aged(mut self, secs: u64) -> Self {
        for n in &mut self.nodes {
            n.start_time += secs;
        }
        self
    }

    pub fn build(self) -> Vec<StubNode> {
        self.nodes
    }
}

/// Logging for tests, safe to call from every test.
pub fn init_test_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}
