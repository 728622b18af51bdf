//! # Topic Router
//!
//! Topic-name routing abstraction, mirroring the reference architecture's
//! `MessageRouter` queue-naming trait but for pub/sub topics. Separates
//! naming convention from the Bus Port's publish/subscribe mechanics.

use serde::{Deserialize, Serialize};

/// Canonical and legacy response topic configuration (spec §4.7, §9: "the
/// implementation must treat the list as configuration, not code").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseTopicConfig {
    /// Legacy flat topics consumed in addition to the canonical
    /// `job.responses.<workerType>` family, for backward compatibility.
    pub legacy_topics: Vec<String>,
}

impl Default for ResponseTopicConfig {
    fn default() -> Self {
        Self {
            legacy_topics: vec![
                "llm.responses".to_string(),
                "resume.bullet.evaluate.response".to_string(),
            ],
        }
    }
}

/// Topic-name routing for task dispatch and response consumption.
#[derive(Debug, Clone, Default)]
pub struct TopicRouter {
    pub response_topics: ResponseTopicConfig,
}

impl TopicRouter {
    pub fn new(response_topics: ResponseTopicConfig) -> Self {
        Self { response_topics }
    }

    /// Task dispatch topic: `tasks.<workerType>` (spec §4.5 step 3).
    pub fn task_topic(&self, worker_type: &str) -> String {
        format!("tasks.{worker_type}")
    }

    /// Canonical response topic for a worker type: `job.responses.<workerType>`
    /// (spec §4.7).
    pub fn canonical_response_topic(&self, worker_type: &str) -> String {
        format!("job.responses.{worker_type}")
    }

    /// Canonical response topic for every worker type the catalog knows
    /// about, plus every configured legacy topic — the full subscription
    /// set for the Response Correlator (spec §4.7).
    pub fn all_response_topics(&self, worker_types: &[String]) -> Vec<String> {
        let mut topics: Vec<String> = worker_types
            .iter()
            .map(|t| self.canonical_response_topic(t))
            .collect();
        topics.extend(self.response_topics.legacy_topics.iter().cloned());
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_topic_pattern() {
        let router = TopicRouter::default();
        assert_eq!(router.task_topic("llm"), "tasks.llm");
    }

    #[test]
    fn canonical_response_topic_pattern() {
        let router = TopicRouter::default();
        assert_eq!(
            router.canonical_response_topic("resume"),
            "job.responses.resume"
        );
    }

    #[test]
    fn all_response_topics_includes_legacy() {
        let router = TopicRouter::default();
        let topics = router.all_response_topics(&["llm".to_string()]);
        assert!(topics.contains(&"job.responses.llm".to_string()));
        assert!(topics.contains(&"llm.responses".to_string()));
    }
}
