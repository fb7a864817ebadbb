//! The report pipeline: resolve the window, collect samples, merge them into
//! a timeline, render the diagram.
//!
//! One call, one report. Each stage fully consumes its predecessor's output;
//! a fatal error anywhere aborts the run with no partial output. Re-running
//! against an unchanged historical window produces identical text.

use crate::collect::{CollectError, Collector};
use crate::config::ActivityConfig;
use crate::efd::{EfdReader, EnumRegistry};
use crate::model::Entity;
use crate::window::{self, WindowError};
use crate::{merge, render};

/// Fatal pipeline errors, tagged with the failing stage.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("window resolution failed: {0}")]
    Window(#[from] WindowError),

    #[error("sample collection failed: {0}")]
    Collect(#[from] CollectError),
}

/// Generate the activity report for one configuration.
pub fn generate(
    config: &ActivityConfig,
    reader: &dyn EfdReader,
    enums: &EnumRegistry,
) -> Result<String, ReportError> {
    let fallback = window::resolve_explicit(config.time_start, config.time_end)?;
    let window = match &config.actor.event {
        Some(spec) => {
            window::resolve_from_event(reader, &config.actor.entity, &spec.name, fallback)?
        }
        None => fallback,
    };

    let streams = Collector::new(reader, enums, config).collect(window)?;
    let timeline = merge::merge(streams);

    let participants: Vec<Entity> = config
        .participants
        .iter()
        .map(|p| p.entity.clone())
        .collect();
    Ok(render::render(&config.actor.entity, &participants, &timeline))
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::config::{ActorSpec, AttributeSpec, EnumBinding, ParticipantSpec, TopicSpec};
    use crate::efd::testing::{FakeEfd, row};
    use crate::model::Role;

    fn config(actor_event: Option<TopicSpec>, events: Vec<TopicSpec>) -> ActivityConfig {
        ActivityConfig {
            efd_name: "tucson_teststand_efd".to_string(),
            time_start: "2022-09-13T00:00:00Z".parse().unwrap(),
            time_end: "2022-09-15T00:00:00Z".parse().unwrap(),
            actor: ActorSpec {
                entity: Entity::parse("Script:200084", Role::Actor).unwrap(),
                event: actor_event,
            },
            participants: vec![ParticipantSpec {
                entity: Entity::parse("ATAOS", Role::Participant).unwrap(),
                events,
            }],
            output: None,
        }
    }

    fn summary_state_spec() -> TopicSpec {
        TopicSpec {
            name: "logevent_summaryState".to_string(),
            attributes: vec![AttributeSpec {
                name: "summaryState".to_string(),
                enum_binding: Some(EnumBinding {
                    namespace: "lsst.ts.salobj".to_string(),
                    name: "State".to_string(),
                }),
            }],
        }
    }

    fn registry() -> EnumRegistry {
        EnumRegistry::from_toml(
            r#"
            ["lsst.ts.salobj.State"]
            1 = "DISABLED"
            2 = "ENABLED"
            "#,
        )
        .unwrap()
    }

    fn two_command_efd() -> FakeEfd {
        FakeEfd::default()
            .with_series(
                "lsst.sal.ATAOS.command_enableCorrection",
                vec![row("2022-09-14T08:00:00Z", &[])],
            )
            .with_series(
                "lsst.sal.ATAOS.command_offset",
                vec![row("2022-09-14T08:09:06Z", &[])],
            )
            .with_series(
                "lsst.sal.ATAOS.ackcmd",
                vec![
                    row("2022-09-14T08:00:01Z", &[("ack", json!(303))]),
                    row("2022-09-14T08:09:07Z", &[("ack", json!(303))]),
                ],
            )
    }

    #[test]
    fn full_report_with_participant_event() {
        let efd = two_command_efd().with_series(
            "lsst.sal.ATAOS.logevent_summaryState",
            vec![row("2022-09-14T08:00:02Z", &[("summaryState", json!(2))])],
        );
        let config = config(None, vec![summary_state_spec()]);

        let report = generate(&config, &efd, &registry()).unwrap();
        assert_eq!(
            report,
            "@startuml\n\
             actor Script:200084\n\
             participant ATAOS\n\
             Script:200084 -> ATAOS : command_enableCorrection\n\
             ATAOS --> Script:200084 : command_enableCorrection ack\n\
             note over ATAOS : logevent_summaryState(summaryState=ENABLED)\n\
             Script:200084 -> ATAOS : command_offset\n\
             ATAOS --> Script:200084 : command_offset ack\n\
             @enduml\n"
        );
    }

    #[test]
    fn no_participant_events_means_no_notes() {
        let config = config(None, vec![]);

        let report = generate(&config, &two_command_efd(), &registry()).unwrap();
        assert!(!report.contains("note over"));
        assert!(report.contains("Script:200084 -> ATAOS : command_offset"));
        assert!(report.contains("ATAOS --> Script:200084 : command_offset ack"));
    }

    #[test]
    fn actor_event_narrows_the_window_and_adds_notes() {
        // A command before the first actor event sample must not appear.
        let efd = FakeEfd::default()
            .with_series(
                "lsst.sal.Script.logevent_state",
                vec![
                    row("2022-09-14T08:00:00Z", &[("state", json!(1))]),
                    row("2022-09-14T08:09:00Z", &[("state", json!(3))]),
                ],
            )
            .with_series(
                "lsst.sal.ATAOS.command_offset",
                vec![
                    row("2022-09-14T07:00:00Z", &[]),
                    row("2022-09-14T08:05:00Z", &[]),
                ],
            );
        let config = config(
            Some(TopicSpec {
                name: "logevent_state".to_string(),
                attributes: vec![AttributeSpec {
                    name: "state".to_string(),
                    enum_binding: None,
                }],
            }),
            vec![],
        );

        let report = generate(&config, &efd, &registry()).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[3], "note over Script:200084 : logevent_state(state=1)");
        assert_eq!(lines[4], "Script:200084 -> ATAOS : command_offset");
        assert_eq!(lines[5], "note over Script:200084 : logevent_state(state=3)");
        assert_eq!(report.matches("command_offset").count(), 1);
    }

    #[test]
    fn actor_event_outranks_a_simultaneous_command() {
        let efd = FakeEfd::default()
            .with_series(
                "lsst.sal.Script.logevent_state",
                vec![row("2022-09-14T08:09:06Z", &[("state", json!(1))])],
            )
            .with_series(
                "lsst.sal.ATAOS.command_offset",
                vec![row("2022-09-14T08:09:06Z", &[])],
            );
        let config = config(
            Some(TopicSpec {
                name: "logevent_state".to_string(),
                attributes: vec![AttributeSpec {
                    name: "state".to_string(),
                    enum_binding: None,
                }],
            }),
            vec![],
        );

        let report = generate(&config, &efd, &registry()).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[3], "note over Script:200084 : logevent_state(state=1)");
        assert_eq!(lines[4], "Script:200084 -> ATAOS : command_offset");
    }

    #[test]
    fn inverted_window_fails_at_the_window_stage() {
        let mut config = config(None, vec![]);
        std::mem::swap(&mut config.time_start, &mut config.time_end);

        let err = generate(&config, &FakeEfd::default(), &registry()).unwrap_err();
        assert!(matches!(err, ReportError::Window(_)));
        assert!(err.to_string().starts_with("window resolution failed"));
    }

    #[test]
    fn rerun_is_idempotent() {
        let efd = two_command_efd().with_series(
            "lsst.sal.ATAOS.logevent_summaryState",
            vec![row("2022-09-14T08:00:02Z", &[("summaryState", json!(2))])],
        );
        let config = config(None, vec![summary_state_spec()]);
        let registry = registry();

        let first = generate(&config, &efd, &registry).unwrap();
        let second = generate(&config, &efd, &registry).unwrap();
        assert_eq!(first, second);
    }
}
