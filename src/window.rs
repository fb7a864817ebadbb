//! Time window resolution.
//!
//! A report runs over exactly one resolved window. Explicit bounds are taken
//! verbatim; when the actor has a window-bounding event, the window narrows
//! to the span of that event's samples within the explicit bounds.

use jiff::Timestamp;

use crate::efd::{EfdError, EfdReader};
use crate::model::{Entity, TimeWindow};

/// Errors from window resolution.
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("invalid window: end {end} is not after start {start}")]
    InvalidWindow { start: Timestamp, end: Timestamp },

    #[error("no samples of {topic} for {entity} between {start} and {end}")]
    EmptyWindow {
        entity: String,
        topic: String,
        start: Timestamp,
        end: Timestamp,
    },

    #[error(transparent)]
    Efd(#[from] EfdError),
}

/// Resolve explicit bounds, rejecting inverted or empty intervals.
pub fn resolve_explicit(start: Timestamp, end: Timestamp) -> Result<TimeWindow, WindowError> {
    if end <= start {
        return Err(WindowError::InvalidWindow { start, end });
    }
    Ok(TimeWindow { start, end })
}

/// Narrow a window to the span of an actor event's samples within it.
///
/// The result runs from the first to the last sample timestamp; a single
/// sample yields an instant (`start == end`). Zero samples means there is
/// nothing to bound the report and resolution fails.
pub fn resolve_from_event(
    reader: &dyn EfdReader,
    entity: &Entity,
    topic: &str,
    fallback: TimeWindow,
) -> Result<TimeWindow, WindowError> {
    let rows = reader.select_time_series(entity, topic, &[], fallback)?;

    match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => Ok(TimeWindow {
            start: first.timestamp,
            end: last.timestamp,
        }),
        _ => Err(WindowError::EmptyWindow {
            entity: entity.to_string(),
            topic: topic.to_string(),
            start: fallback.start,
            end: fallback.end,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::efd::testing::{FakeEfd, row};
    use crate::model::Role;

    fn ts(text: &str) -> Timestamp {
        text.parse().unwrap()
    }

    fn actor() -> Entity {
        Entity::parse("Script:200084", Role::Actor).unwrap()
    }

    #[test]
    fn explicit_bounds_are_returned_unchanged() {
        let start = ts("2022-09-13T00:00:00Z");
        let end = ts("2022-09-15T00:00:00Z");

        let window = resolve_explicit(start, end).unwrap();
        assert_eq!(window, TimeWindow { start, end });
    }

    #[test]
    fn inverted_bounds_are_invalid() {
        let start = ts("2022-09-15T00:00:00Z");
        let end = ts("2022-09-13T00:00:00Z");

        let err = resolve_explicit(start, end).unwrap_err();
        assert!(matches!(err, WindowError::InvalidWindow { .. }));
    }

    #[test]
    fn equal_bounds_are_invalid() {
        let start = ts("2022-09-13T00:00:00Z");
        let err = resolve_explicit(start, start).unwrap_err();
        assert!(matches!(err, WindowError::InvalidWindow { .. }));
    }

    #[test]
    fn event_samples_bound_the_window() {
        let efd = FakeEfd::default().with_series(
            "lsst.sal.Script.logevent_state",
            vec![
                row("2022-09-14T08:00:36Z", &[]),
                row("2022-09-14T08:04:07Z", &[]),
                row("2022-09-14T08:09:06Z", &[]),
            ],
        );
        let fallback = TimeWindow {
            start: ts("2022-09-13T00:00:00Z"),
            end: ts("2022-09-15T00:00:00Z"),
        };

        let window = resolve_from_event(&efd, &actor(), "logevent_state", fallback).unwrap();
        assert_eq!(window.start, ts("2022-09-14T08:00:36Z"));
        assert_eq!(window.end, ts("2022-09-14T08:09:06Z"));
    }

    #[test]
    fn single_sample_collapses_to_an_instant() {
        let efd = FakeEfd::default().with_series(
            "lsst.sal.Script.logevent_state",
            vec![row("2022-09-14T08:00:36Z", &[])],
        );
        let fallback = TimeWindow {
            start: ts("2022-09-13T00:00:00Z"),
            end: ts("2022-09-15T00:00:00Z"),
        };

        let window = resolve_from_event(&efd, &actor(), "logevent_state", fallback).unwrap();
        assert_eq!(window.start, window.end);
    }

    #[test]
    fn no_samples_is_an_empty_window() {
        let efd = FakeEfd::default();
        let fallback = TimeWindow {
            start: ts("2022-09-13T00:00:00Z"),
            end: ts("2022-09-15T00:00:00Z"),
        };

        let err =
            resolve_from_event(&efd, &actor(), "logevent_state", fallback).unwrap_err();
        assert!(matches!(err, WindowError::EmptyWindow { .. }));
    }

    #[test]
    fn samples_outside_the_fallback_are_ignored() {
        let efd = FakeEfd::default().with_series(
            "lsst.sal.Script.logevent_state",
            vec![
                row("2022-09-12T00:00:00Z", &[]),
                row("2022-09-14T08:00:36Z", &[]),
            ],
        );
        let fallback = TimeWindow {
            start: ts("2022-09-13T00:00:00Z"),
            end: ts("2022-09-15T00:00:00Z"),
        };

        let window = resolve_from_event(&efd, &actor(), "logevent_state", fallback).unwrap();
        assert_eq!(window.start, ts("2022-09-14T08:00:36Z"));
    }
}
