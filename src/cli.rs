//! Command-line interface for efd-report.
//!
//! One non-interactive command: arguments in, UML sequence-diagram text out
//! (stdout or `--output`). The per-participant event options use a compact
//! mini-grammar inherited from the original operator tooling:
//!
//! - `;` separates participants,
//! - `:` separates events of one participant (attributes/enum options only),
//! - `,` separates events in `--participants-events`, and attributes of one
//!   event everywhere else.
//!
//! Every split must match the arity of what it configures; a mismatch is a
//! configuration error, not a guess.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;

use crate::config::{ActivityConfig, ActorSpec, AttributeSpec, EnumBinding, ParticipantSpec, TopicSpec};
use crate::efd::EnumRegistry;
use crate::efd::influx::InfluxReader;
use crate::model::{Entity, Role};
use crate::report;

/// Generate a UML sequence diagram of one actor's command exchange with a
/// set of participants, from recorded EFD data.
#[derive(Debug, Parser)]
#[command(name = "efd-report", after_long_help = GRAMMAR_HELP)]
pub struct Cli {
    /// Name of the EFD instance to query (selects `~/.efd-report/<name>.toml`).
    #[arg(long)]
    efd_name: String,

    /// Start of the activity window, `YYYY-MM-DDThh:mm:ss` (UTC).
    #[arg(long)]
    time_start: String,

    /// End of the activity window, same format as --time-start.
    #[arg(long)]
    time_end: String,

    /// Component driving the operation. Indexed components use `Name:index`.
    #[arg(long)]
    actor: String,

    /// Actor event whose first/last samples narrow the window.
    #[arg(long)]
    actor_event: Option<String>,

    /// Attribute of the actor event to display on its notes.
    #[arg(long, requires = "actor_event")]
    actor_event_attribute: Option<String>,

    /// Enum type translating the actor event attribute.
    #[arg(
        long,
        requires = "actor_event_attribute",
        requires = "actor_event_enum_namespace"
    )]
    actor_event_enum: Option<String>,

    /// Namespace of the actor event enum, e.g. `lsst.ts.idl.enums.Script`.
    #[arg(long, requires = "actor_event_enum")]
    actor_event_enum_namespace: Option<String>,

    /// Participant components, `Name` or `Name:index`.
    #[arg(long, num_args = 1.., required = true)]
    participants: Vec<String>,

    /// Events to include per participant (see the mini-grammar below).
    #[arg(long)]
    participants_events: Option<String>,

    /// Attributes to display per participant event.
    #[arg(long, requires = "participants_events")]
    participants_events_attributes: Option<String>,

    /// Enum types translating the event attributes.
    #[arg(
        long,
        requires = "participants_events_attributes",
        requires = "participants_events_enum_namespace"
    )]
    participants_events_attributes_enum: Option<String>,

    /// Namespaces of the event attribute enums.
    #[arg(long, requires = "participants_events_attributes_enum")]
    participants_events_enum_namespace: Option<String>,

    /// Write the diagram to this file instead of stdout. The text can be
    /// processed with plantuml to produce an image.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enum translation tables (TOML). Defaults to `~/.efd-report/enums.toml`
    /// when that file exists.
    #[arg(long)]
    enum_tables: Option<PathBuf>,
}

const GRAMMAR_HELP: &str = r"Participant event mini-grammar
  --participants ATAOS ATMCS \
  --participants-events 'logevent_summaryState,logevent_heartbeat;logevent_summaryState' \
  --participants-events-attributes 'summaryState:;summaryState' \
  --participants-events-attributes-enum 'State:;State' \
  --participants-events-enum-namespace 'lsst.ts.salobj:;lsst.ts.salobj'

  gives ATAOS two events (summaryState shown for the first, translated via
  the lsst.ts.salobj.State table) and ATMCS one. Leave a segment empty to
  configure nothing for that slot.";

/// Run the CLI, returning an error message on failure.
pub fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let enums = load_enum_tables(cli.enum_tables.as_deref())?;
    let reader = InfluxReader::connect(&config.efd_name)?;

    let participants: Vec<String> = config
        .participants
        .iter()
        .map(|p| p.entity.to_string())
        .collect();
    eprintln!(
        "Actor: {} -> Participants: {}",
        config.actor.entity,
        participants.join(", ")
    );

    let diagram = report::generate(&config, &reader, &enums).map_err(|e| e.to_string())?;

    match &config.output {
        Some(path) => {
            fs::write(path, &diagram)
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => print!("{diagram}"),
    }

    Ok(())
}

/// Build the immutable run configuration from parsed arguments.
fn build_config(cli: &Cli) -> Result<ActivityConfig, String> {
    let actor = ActorSpec {
        entity: Entity::parse(&cli.actor, Role::Actor)?,
        event: cli.actor_event.as_ref().map(|name| TopicSpec {
            name: name.clone(),
            attributes: actor_attributes(cli),
        }),
    };

    let participants = participant_specs(cli)?;

    Ok(ActivityConfig {
        efd_name: cli.efd_name.clone(),
        time_start: parse_time(&cli.time_start)?,
        time_end: parse_time(&cli.time_end)?,
        actor,
        participants,
        output: cli.output.clone(),
    })
}

fn actor_attributes(cli: &Cli) -> Vec<AttributeSpec> {
    let Some(name) = &cli.actor_event_attribute else {
        return Vec::new();
    };
    // clap guarantees the enum name and namespace arrive as a pair.
    let enum_binding = cli
        .actor_event_enum
        .as_ref()
        .zip(cli.actor_event_enum_namespace.as_ref())
        .map(|(enum_name, namespace)| EnumBinding {
            namespace: namespace.clone(),
            name: enum_name.clone(),
        });
    vec![AttributeSpec {
        name: name.clone(),
        enum_binding,
    }]
}

/// Expand the participant mini-grammar into one spec per participant.
fn participant_specs(cli: &Cli) -> Result<Vec<ParticipantSpec>, String> {
    let count = cli.participants.len();
    let events_groups = split_to_match(
        cli.participants_events.as_deref(),
        count,
        ';',
        "participant event groups",
    )?;
    let attributes_groups = split_to_match(
        cli.participants_events_attributes.as_deref(),
        count,
        ';',
        "participant attribute groups",
    )?;
    let enum_groups = split_to_match(
        cli.participants_events_attributes_enum.as_deref(),
        count,
        ';',
        "participant enum groups",
    )?;
    let namespace_groups = split_to_match(
        cli.participants_events_enum_namespace.as_deref(),
        count,
        ';',
        "participant enum namespace groups",
    )?;

    let mut specs = Vec::with_capacity(count);
    for (i, reference) in cli.participants.iter().enumerate() {
        if cli.participants[..i].contains(reference) {
            return Err(format!("duplicate participant '{reference}'"));
        }

        let entity = Entity::parse(reference, Role::Participant)?;
        let events = participant_events(
            reference,
            &events_groups[i],
            &attributes_groups[i],
            &enum_groups[i],
            &namespace_groups[i],
        )?;
        specs.push(ParticipantSpec { entity, events });
    }
    Ok(specs)
}

/// Expand one participant's event/attribute/enum segments.
fn participant_events(
    participant: &str,
    events: &str,
    attributes: &str,
    enums: &str,
    namespaces: &str,
) -> Result<Vec<TopicSpec>, String> {
    let event_names: Vec<&str> = if events.is_empty() {
        Vec::new()
    } else {
        events.split(',').collect()
    };
    let count = event_names.len();

    let what = |part: &str| format!("{part} for participant {participant}");
    let attribute_lists = split_to_match(some_nonempty(attributes), count, ':', &what("attribute lists"))?;
    let enum_lists = split_to_match(some_nonempty(enums), count, ':', &what("enum lists"))?;
    let namespace_lists =
        split_to_match(some_nonempty(namespaces), count, ':', &what("enum namespace lists"))?;

    let mut specs = Vec::new();
    for (((event, attributes), enums), namespaces) in event_names
        .iter()
        .zip(&attribute_lists)
        .zip(&enum_lists)
        .zip(&namespace_lists)
    {
        // An empty segment leaves a hole in the grammar: no event here.
        if event.is_empty() {
            continue;
        }
        specs.push(TopicSpec {
            name: (*event).to_string(),
            attributes: event_attributes(event, attributes, enums, namespaces)?,
        });
    }
    Ok(specs)
}

/// Expand one event's comma-separated attribute and enum segments.
fn event_attributes(
    event: &str,
    attributes: &str,
    enums: &str,
    namespaces: &str,
) -> Result<Vec<AttributeSpec>, String> {
    let names: Vec<&str> = if attributes.is_empty() {
        Vec::new()
    } else {
        attributes.split(',').collect()
    };
    let count = names.len();

    let what = |part: &str| format!("{part} for event {event}");
    let enum_names = split_to_match(some_nonempty(enums), count, ',', &what("enums"))?;
    let namespace_names = split_to_match(some_nonempty(namespaces), count, ',', &what("enum namespaces"))?;

    names
        .iter()
        .zip(&enum_names)
        .zip(&namespace_names)
        .map(|((name, enum_name), namespace)| {
            let enum_binding = match (enum_name.is_empty(), namespace.is_empty()) {
                (true, true) => None,
                (false, false) => Some(EnumBinding {
                    namespace: namespace.clone(),
                    name: enum_name.clone(),
                }),
                _ => {
                    return Err(format!(
                        "attribute {name} of {event} needs both an enum name and a namespace"
                    ));
                }
            };
            Ok(AttributeSpec {
                name: (*name).to_string(),
                enum_binding,
            })
        })
        .collect()
}

/// Split `text` on `sep` into exactly `expected` segments.
///
/// A missing or empty input stands for "nothing configured anywhere" and
/// expands to `expected` empty segments.
fn split_to_match(
    text: Option<&str>,
    expected: usize,
    sep: char,
    what: &str,
) -> Result<Vec<String>, String> {
    let Some(text) = text.filter(|t| !t.is_empty()) else {
        return Ok(vec![String::new(); expected]);
    };

    let segments: Vec<String> = text.split(sep).map(str::to_string).collect();
    if segments.len() != expected {
        return Err(format!(
            "expected {expected} '{sep}'-separated {what}, got {} in '{text}'",
            segments.len()
        ));
    }
    Ok(segments)
}

fn some_nonempty(text: &str) -> Option<&str> {
    (!text.is_empty()).then_some(text)
}

/// Parse an activity bound: RFC 3339, or a bare civil datetime taken as UTC.
fn parse_time(text: &str) -> Result<Timestamp, String> {
    if let Ok(timestamp) = text.parse::<Timestamp>() {
        return Ok(timestamp);
    }
    let datetime: DateTime = text
        .parse()
        .map_err(|_| format!("invalid time '{text}': expected YYYY-MM-DDThh:mm:ss (UT)"))?;
    datetime
        .to_zoned(TimeZone::UTC)
        .map(|zoned| zoned.timestamp())
        .map_err(|e| format!("invalid time '{text}': {e}"))
}

/// Load the enum registry: the explicit path, the default file if present,
/// or an empty registry.
fn load_enum_tables(explicit: Option<&Path>) -> Result<EnumRegistry, String> {
    if let Some(path) = explicit {
        return EnumRegistry::load(path);
    }
    let Some(home) = dirs::home_dir() else {
        return Ok(EnumRegistry::default());
    };
    let path = home.join(".efd-report").join("enums.toml");
    if path.exists() {
        EnumRegistry::load(&path)
    } else {
        Ok(EnumRegistry::default())
    }
}
