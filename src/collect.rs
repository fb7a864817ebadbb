//! Sample collection: gather and enrich everything the report needs.
//!
//! The collector walks the configuration in a fixed order and produces one
//! sample stream per fetch. Stream order is load-bearing: it is the
//! tie-break key when the merge step sorts by timestamp. The actor's own
//! event stream comes first, then per participant the command streams and
//! the acknowledgement stream, then the participant event streams.
//!
//! Error policy follows the data's importance. Command and acknowledgement
//! fetches are the primary interaction record and any failure is fatal.
//! Event enrichment degrades: a missing attribute or unknown enum value on a
//! participant event drops the decoration, never the report. Only the
//! actor's window-bounding event has required attributes.

use jiff::Timestamp;
use serde_json::Value;

use crate::config::{ActivityConfig, TopicSpec};
use crate::efd::{EfdError, EfdReader, EnumRegistry, Row};
use crate::model::{Entity, Sample, SampleKind, TimeWindow};

/// Fatal collection errors. Degradable conditions never surface here.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to fetch {topic} for {entity}: {source}")]
    FetchFailed {
        entity: String,
        topic: String,
        #[source]
        source: EfdError,
    },

    #[error("sample of {topic} at {timestamp} has no attribute '{attribute}'")]
    MissingAttribute {
        topic: String,
        attribute: String,
        timestamp: Timestamp,
    },
}

/// Gathers all samples for one report run.
pub struct Collector<'a> {
    reader: &'a dyn EfdReader,
    enums: &'a EnumRegistry,
    config: &'a ActivityConfig,
}

impl<'a> Collector<'a> {
    pub fn new(
        reader: &'a dyn EfdReader,
        enums: &'a EnumRegistry,
        config: &'a ActivityConfig,
    ) -> Self {
        Self {
            reader,
            enums,
            config,
        }
    }

    /// Collect every sample stream within the window, in tie-break order.
    pub fn collect(&self, window: TimeWindow) -> Result<Vec<Vec<Sample>>, CollectError> {
        let mut streams = Vec::new();

        let mut origin = None;
        if let Some(spec) = &self.config.actor.event {
            let actor_events = self.collect_event(
                &self.config.actor.entity,
                spec,
                window,
                AttributePolicy::Required,
            )?;
            origin = actor_origin(&actor_events);
            streams.push(actor_events);
        }

        for participant in &self.config.participants {
            streams.extend(self.collect_exchange(&participant.entity, window, origin)?);
        }

        for participant in &self.config.participants {
            for spec in &participant.events {
                streams.push(self.collect_event(
                    &participant.entity,
                    spec,
                    window,
                    AttributePolicy::BestEffort,
                )?);
            }
        }

        Ok(streams)
    }

    /// Collect the command streams and the acknowledgement stream for one
    /// participant.
    ///
    /// Command topics are discovered from the store's topic list rather than
    /// configured: every `command_*` topic in the participant's namespace
    /// that has samples in the window contributes a stream. When at least
    /// one command was seen, the participant's `ackcmd` topic is fetched and
    /// each acknowledgement is labelled with the closest command at or
    /// before it; correlation is temporal, there is no shared key.
    ///
    /// When the actor's origin identifier is known, command rows from other
    /// origins are dropped so the exchange only shows commands the actor
    /// itself sent. Without it, every command in the window is attributed to
    /// the actor.
    fn collect_exchange(
        &self,
        participant: &Entity,
        window: TimeWindow,
        origin: Option<i64>,
    ) -> Result<Vec<Vec<Sample>>, CollectError> {
        let fetch_failed = |topic: &str, source: EfdError| CollectError::FetchFailed {
            entity: participant.to_string(),
            topic: topic.to_string(),
            source,
        };

        let topics = self
            .reader
            .topics()
            .map_err(|e| fetch_failed("measurements", e))?;

        let prefix = format!("{}.command_", participant.namespace());
        let command_topics = topics.iter().filter(|t| t.starts_with(&prefix));

        let mut streams = Vec::new();
        let mut sent: Vec<(Timestamp, String)> = Vec::new();

        for full_name in command_topics {
            let short = short_name(full_name);
            let mut rows = self
                .reader
                .select_time_series(participant, short, &[], window)
                .map_err(|e| fetch_failed(short, e))?;
            if let Some(origin) = origin {
                rows.retain(|row| {
                    row.fields.get("private_origin").and_then(Value::as_i64) == Some(origin)
                });
            }
            if rows.is_empty() {
                continue;
            }

            for row in &rows {
                sent.push((row.timestamp, short.to_string()));
            }
            streams.push(
                rows.into_iter()
                    .map(|row| plain_sample(participant, short, SampleKind::Command, row))
                    .collect(),
            );
        }

        if sent.is_empty() {
            return Ok(streams);
        }
        sent.sort();

        let ack_rows = self
            .reader
            .select_time_series(participant, "ackcmd", &[], window)
            .map_err(|e| fetch_failed("ackcmd", e))?;

        let acks = ack_rows
            .into_iter()
            .map(|row| {
                let label = match answered_command(&sent, row.timestamp) {
                    Some(command) => format!("{command} ack"),
                    None => "ack".to_string(),
                };
                plain_sample(participant, &label, SampleKind::Acknowledgement, row)
            })
            .collect();
        streams.push(acks);

        Ok(streams)
    }

    /// Collect one configured event stream, extracting the attributes to
    /// display and translating enum-bound values.
    ///
    /// A fetch failure on an event topic drops the stream: events decorate
    /// the report but the command exchange stands on its own. An unknown
    /// enum value falls back to the raw value. Missing attributes degrade
    /// unless the policy says they are required.
    fn collect_event(
        &self,
        entity: &Entity,
        spec: &TopicSpec,
        window: TimeWindow,
        policy: AttributePolicy,
    ) -> Result<Vec<Sample>, CollectError> {
        let Ok(rows) = self
            .reader
            .select_time_series(entity, &spec.name, &[], window)
        else {
            return Ok(Vec::new());
        };

        let mut samples = Vec::with_capacity(rows.len());
        for row in rows {
            let mut shown = Vec::new();
            let mut resolved_labels = std::collections::BTreeMap::new();

            for attribute in &spec.attributes {
                let Some(raw) = row.fields.get(&attribute.name) else {
                    if policy == AttributePolicy::Required {
                        return Err(CollectError::MissingAttribute {
                            topic: spec.name.clone(),
                            attribute: attribute.name.clone(),
                            timestamp: row.timestamp,
                        });
                    }
                    continue;
                };

                if let Some(binding) = &attribute.enum_binding
                    && let Ok(label) = self.enums.resolve(binding, raw)
                {
                    resolved_labels.insert(attribute.name.clone(), label);
                }
                shown.push(attribute.name.clone());
            }

            let mut sample = plain_sample(entity, &spec.name, SampleKind::Event, row);
            sample.shown = shown;
            sample.resolved_labels = resolved_labels;
            samples.push(sample);
        }

        Ok(samples)
    }
}

/// Whether missing configured attributes abort the run or are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributePolicy {
    /// The actor's window-bounding event: its attributes are part of the
    /// primary record.
    Required,
    /// Participant events: decoration only.
    BestEffort,
}

/// The actor's origin identifier, read from its own event samples.
///
/// Every sample carries the `private_origin` of the client that wrote it, so
/// the actor's event samples reveal which origin its commands will carry.
fn actor_origin(samples: &[Sample]) -> Option<i64> {
    samples
        .iter()
        .find_map(|s| s.attributes.get("private_origin").and_then(Value::as_i64))
}

/// The closest command sent at or before an acknowledgement.
fn answered_command(sent: &[(Timestamp, String)], ack_time: Timestamp) -> Option<&str> {
    sent.iter()
        .rev()
        .find(|(sent_at, _)| *sent_at <= ack_time)
        .map(|(_, command)| command.as_str())
}

/// Last dotted segment of a full topic name.
fn short_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}

fn plain_sample(entity: &Entity, topic: &str, kind: SampleKind, row: Row) -> Sample {
    Sample {
        topic: topic.to_string(),
        entity: entity.clone(),
        timestamp: row.timestamp,
        kind,
        attributes: row.fields,
        shown: Vec::new(),
        resolved_labels: std::collections::BTreeMap::new(),
    }
}
