//! Chronological merge of all sample streams into one timeline.
//!
//! Timestamps collide routinely (a command and its first acknowledgement can
//! share a timestamp at store resolution), so ordering must not depend on
//! anything arbitrary. The merge is a stable sort over the concatenation of
//! the collector's streams: equal timestamps keep stream order, then
//! within-stream order. No event is reordered after this step.

use serde_json::Value;

use crate::model::{Direction, Sample, SampleKind, TimelineEvent};

/// Merge per-stream samples into one time-ordered sequence of timeline
/// events. Stream order is the tie-break for equal timestamps.
pub fn merge(streams: Vec<Vec<Sample>>) -> Vec<TimelineEvent> {
    let mut samples: Vec<Sample> = streams.into_iter().flatten().collect();
    samples.sort_by_key(|s| s.timestamp);
    samples.into_iter().map(lift).collect()
}

/// Lift a sample into rendering form.
fn lift(sample: Sample) -> TimelineEvent {
    let direction = match sample.kind {
        SampleKind::Command => Direction::ActorToParticipant,
        SampleKind::Acknowledgement => Direction::ParticipantToActor,
        SampleKind::Event => Direction::SelfNote,
    };
    TimelineEvent {
        timestamp: sample.timestamp,
        entity: sample.entity.to_string(),
        direction,
        display_label: display_label(&sample),
    }
}

/// Topic name, decorated with the displayed attributes in configured order.
/// Each attribute shows its enum label when one was resolved, else the raw
/// value.
fn display_label(sample: &Sample) -> String {
    if sample.shown.is_empty() {
        return sample.topic.clone();
    }

    let attributes: Vec<String> = sample
        .shown
        .iter()
        .map(|name| {
            let value = match sample.resolved_labels.get(name) {
                Some(label) => label.clone(),
                None => sample
                    .attributes
                    .get(name)
                    .map_or_else(String::new, value_display),
            };
            format!("{name}={value}")
        })
        .collect();

    format!("{}({})", sample.topic, attributes.join(", "))
}

/// Raw attribute value as display text. Strings drop their JSON quotes.
fn value_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
