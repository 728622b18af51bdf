//! Bus Port configuration (spec §6 `BUS_BROKERS`, `BUS_CLIENT_ID`, `BUS_GROUP_ID`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Broker address for the production AMQP backend. Empty selects the
    /// in-memory backend, which is also what every test in this workspace
    /// runs against (mirrors `StoreConfig::uses_in_memory`).
    pub brokers: String,
    pub client_id: String,
    /// Consumer group id; the orchestrator always subscribes as `orchestrator`
    /// per spec §4.1, but the group id is still configurable for multi-tenant
    /// broker deployments.
    pub group_id: String,
    /// Reconnect poll interval after a connection-refused-class failure
    /// (spec §4.1: "periodic 10 s reconnect loop").
    #[serde(with = "duration_secs")]
    pub reconnect_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: String::new(),
            client_id: "orchestrator-core".to_string(),
            group_id: "orchestrator".to_string(),
            reconnect_interval: Duration::from_secs(10),
        }
    }
}

impl BusConfig {
    pub fn uses_in_memory(&self) -> bool {
        self.brokers.is_empty()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
