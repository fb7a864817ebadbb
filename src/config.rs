//! Report configuration.
//!
//! An [`ActivityConfig`] is built once from the command line and passed down
//! the pipeline as an immutable value. Nothing reads configuration from
//! ambient state after this point.

use std::path::PathBuf;

use jiff::Timestamp;

use crate::model::Entity;

/// Everything one report run needs to know.
#[derive(Debug, Clone)]
pub struct ActivityConfig {
    /// Name of the EFD instance to query (selects the connection profile).
    pub efd_name: String,
    /// Start of the evaluation window.
    pub time_start: Timestamp,
    /// End of the evaluation window.
    pub time_end: Timestamp,
    pub actor: ActorSpec,
    /// Unique by name, in the order given on the command line.
    pub participants: Vec<ParticipantSpec>,
    /// Where to write the diagram; stdout when absent.
    pub output: Option<PathBuf>,
}

/// The actor and its optional window-bounding event.
#[derive(Debug, Clone)]
pub struct ActorSpec {
    pub entity: Entity,
    /// When set, the first and last sample of this event narrow the window,
    /// and each sample appears as a note over the actor.
    pub event: Option<TopicSpec>,
}

/// One participant and the events to include for it.
#[derive(Debug, Clone)]
pub struct ParticipantSpec {
    pub entity: Entity,
    pub events: Vec<TopicSpec>,
}

/// An event topic plus the attributes to display from each sample.
#[derive(Debug, Clone)]
pub struct TopicSpec {
    /// Short topic name, e.g. `logevent_summaryState`.
    pub name: String,
    /// Attributes to show, in display order.
    pub attributes: Vec<AttributeSpec>,
}

/// One displayed attribute, optionally translated through an enum table.
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub name: String,
    pub enum_binding: Option<EnumBinding>,
}

/// Reference to an enum table: namespace plus type name.
///
/// The source system resolved these by importing `namespace.name` at runtime;
/// here the pair keys into the [`crate::efd::EnumRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumBinding {
    pub namespace: String,
    pub name: String,
}

impl EnumBinding {
    /// The registry key, e.g. `lsst.ts.salobj.State`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}
