//! Core data model for activity reports.
//!
//! An activity is one actor exchanging commands and acknowledgements with a
//! set of participants over a bounded time window. Everything retrieved from
//! the EFD becomes a [`Sample`]; the merge step lifts samples into
//! [`TimelineEvent`]s ready for rendering.

use std::collections::BTreeMap;
use std::fmt;

use jiff::Timestamp;
use serde_json::Value;

/// Prefix shared by every control-system topic in the EFD.
pub const TOPIC_PREFIX: &str = "lsst.sal";

/// The part an entity plays in the activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Drives the operation: sends the commands.
    Actor,
    /// Receives commands and publishes events the actor observes.
    Participant,
}

/// A control-system component taking part in the activity.
///
/// Indexed components use the `Name:index` notation (e.g. `Script:200084`).
/// Instances of an indexed component share one topic namespace and are told
/// apart by an index field on each record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub index: Option<u32>,
    pub role: Role,
}

impl Entity {
    /// Parse a `Name` or `Name:index` entity reference.
    pub fn parse(reference: &str, role: Role) -> Result<Self, String> {
        let (name, index) = match reference.split_once(':') {
            Some((name, index)) => {
                let index = index
                    .parse()
                    .map_err(|_| format!("invalid component index in '{reference}'"))?;
                (name, Some(index))
            }
            None => (reference, None),
        };
        if name.is_empty() {
            return Err(format!("empty component name in '{reference}'"));
        }
        Ok(Self {
            name: name.to_string(),
            index,
            role,
        })
    }

    /// The entity's topic namespace, e.g. `lsst.sal.ATAOS`.
    ///
    /// The index is not part of the namespace; indexed instances share topics.
    pub fn namespace(&self) -> String {
        format!("{TOPIC_PREFIX}.{}", self.name)
    }

    /// Full name of one of this entity's topics, e.g. `lsst.sal.ATAOS.ackcmd`.
    pub fn topic(&self, topic: &str) -> String {
        format!("{}.{topic}", self.namespace())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}:{index}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A resolved `[start, end]` interval.
///
/// Explicit windows always have `end > start`; an event-bounded window with a
/// single sample collapses to an instant (`start == end`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    /// Whether a timestamp falls within the window (bounds inclusive).
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// What kind of record a sample is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Command,
    Acknowledgement,
    Event,
}

/// One record retrieved from the EFD, enriched for rendering.
///
/// `attributes` holds the raw fields of the record. `shown` lists the
/// attribute names to display, in configured order; `resolved_labels` holds
/// enum translations for the subset of those that had a table entry.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Display name of the topic (last dotted segment, e.g. `command_offset`).
    pub topic: String,
    pub entity: Entity,
    pub timestamp: Timestamp,
    pub kind: SampleKind,
    pub attributes: BTreeMap<String, Value>,
    pub shown: Vec<String>,
    pub resolved_labels: BTreeMap<String, String>,
}

/// Message direction of a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// A command arrow from the actor to the owning participant.
    ActorToParticipant,
    /// An acknowledgement arrow from the owning participant back to the actor.
    ParticipantToActor,
    /// A published event, shown as a note over the owning entity.
    SelfNote,
}

/// A sample lifted into rendering form: direction plus a baked display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub timestamp: Timestamp,
    /// Display name of the entity the sample belongs to.
    pub entity: String,
    pub direction: Direction,
    pub display_label: String,
}
