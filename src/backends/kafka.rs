//! Kafka message bus on `rskafka`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rskafka::client::partition::{OffsetAt, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder};
use tracing::debug;

use super::{BusConsumer, MessageBus, PartitionOffset};
use crate::error::ProbeError;

const FETCH_MAX_BYTES: i32 = 1_000_000;
const FETCH_MAX_WAIT_MS: i32 = 500;

/// Message bus backed by a Kafka cluster.
pub struct KafkaBus {
    brokers: Vec<String>,
    client: Client,
}

impl fmt::Debug for KafkaBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaBus")
            .field("brokers", &self.brokers)
            .finish_non_exhaustive()
    }
}

impl KafkaBus {
    /// Connect to a comma-separated list of bootstrap brokers.
    pub async fn connect(brokers: &str) -> Result<Self, ProbeError> {
        let brokers = parse_brokers(brokers);
        if brokers.is_empty() {
            return Err(ProbeError::Configuration("no Kafka brokers given".into()));
        }
        let client = ClientBuilder::new(brokers.clone())
            .build()
            .await
            .map_err(|e| ProbeError::MessageBus(format!("connect: {e}")))?;
        Ok(Self { brokers, client })
    }

    /// Partition ids of `topic`; empty when the topic does not exist.
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, ProbeError> {
        let topics = self
            .client
            .list_topics()
            .await
            .map_err(|e| ProbeError::MessageBus(format!("list topics: {e}")))?;
        Ok(topics
            .into_iter()
            .find(|t| t.name == topic)
            .map(|t| t.partitions.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn partition_client(&self, topic: &str, partition: i32) -> Result<PartitionClient, ProbeError> {
        self.client
            .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error)
            .await
            .map_err(|e| ProbeError::MessageBus(format!("partition {partition}: {e}")))
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    async fn end_offsets(&self, topic: &str) -> Result<Vec<PartitionOffset>, ProbeError> {
        let mut offsets = Vec::new();
        for partition in self.partitions(topic).await? {
            let latest = match self.partition_client(topic, partition).await {
                Ok(client) => client.get_offset(OffsetAt::Latest).await.map_err(|e| e.to_string()),
                Err(err) => Err(err.to_string()),
            };
            offsets.push(match latest {
                Ok(offset) => PartitionOffset {
                    partition,
                    offset,
                    error: None,
                },
                Err(error) => PartitionOffset {
                    partition,
                    offset: 0,
                    error: Some(error),
                },
            });
        }
        Ok(offsets)
    }

    async fn consume_from_start(&self, topic: &str) -> Result<Box<dyn BusConsumer>, ProbeError> {
        let mut cursors = Vec::new();
        for partition in self.partitions(topic).await? {
            let client = self.partition_client(topic, partition).await?;
            let next = client
                .get_offset(OffsetAt::Earliest)
                .await
                .map_err(|e| ProbeError::MessageBus(format!("partition {partition}: {e}")))?;
            cursors.push(Cursor { client, next });
        }
        debug!(topic, partitions = cursors.len(), "kafka consumer opened");
        Ok(Box::new(KafkaConsumer { cursors, turn: 0 }))
    }
}

struct Cursor {
    client: PartitionClient,
    next: i64,
}

/// Fetches partitions round-robin, one partition per poll.
struct KafkaConsumer {
    cursors: Vec<Cursor>,
    turn: usize,
}

#[async_trait]
impl BusConsumer for KafkaConsumer {
    async fn poll(&mut self) -> Result<Vec<Vec<u8>>, ProbeError> {
        if self.cursors.is_empty() {
            tokio::time::sleep(Duration::from_millis(FETCH_MAX_WAIT_MS as u64)).await;
            return Ok(Vec::new());
        }
        let idx = self.turn % self.cursors.len();
        self.turn = self.turn.wrapping_add(1);
        let cursor = &mut self.cursors[idx];

        let (records, _high_watermark) = cursor
            .client
            .fetch_records(cursor.next, 1..FETCH_MAX_BYTES, FETCH_MAX_WAIT_MS)
            .await
            .map_err(|e| ProbeError::MessageBus(e.to_string()))?;

        let mut values = Vec::with_capacity(records.len());
        for record in records {
            // compressed batches can start before the requested offset
            if record.offset < cursor.next {
                continue;
            }
            cursor.next = record.offset + 1;
            values.push(record.record.value.unwrap_or_default());
        }
        Ok(values)
    }
}

/// Split a comma-separated broker list, dropping blanks.
pub fn parse_brokers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_lists_are_split_and_trimmed() {
        assert_eq!(
            parse_brokers("kafka-1:9092, kafka-2:9092,,"),
            vec!["kafka-1:9092".to_string(), "kafka-2:9092".to_string()]
        );
        assert!(parse_brokers(" , ").is_empty());
    }

    #[tokio::test]
    async fn connecting_without_brokers_is_a_configuration_error() {
        let err = KafkaBus::connect(" ").await.unwrap_err();
        assert!(matches!(err, ProbeError::Configuration(_)), "{err:?}");
    }
}
