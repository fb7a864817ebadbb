//! UML sequence-diagram rendering.
//!
//! Pure text generation: identical input always produces byte-identical
//! output, because downstream diagram tools consume this verbatim. The
//! grammar is fixed: `@startuml`, declarations (actor first, participants
//! in input order), one line per timeline event, `@enduml`.

use crate::model::{Direction, Entity, TimelineEvent};

/// Render the merged timeline as UML sequence-diagram source text.
pub fn render(actor: &Entity, participants: &[Entity], timeline: &[TimelineEvent]) -> String {
    let mut out = String::from("@startuml\n");

    out.push_str(&format!("actor {actor}\n"));
    for participant in participants {
        out.push_str(&format!("participant {participant}\n"));
    }

    for event in timeline {
        let line = match event.direction {
            Direction::ActorToParticipant => {
                format!("{actor} -> {} : {}", event.entity, event.display_label)
            }
            Direction::ParticipantToActor => {
                format!("{} --> {actor} : {}", event.entity, event.display_label)
            }
            Direction::SelfNote => {
                format!("note over {} : {}", event.entity, event.display_label)
            }
        };
        out.push_str(&line);
        out.push('\n');
    }

    out.push_str("@enduml\n");
    out
}
