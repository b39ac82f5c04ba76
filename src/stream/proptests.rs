//! Property-based tests for the multiplexer
//!
//! Arbitrary interleavings of source events, including stray ends, repeated
//! starts and errors, must still produce a well-formed output stream.

use super::*;
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_id() -> impl Strategy<Value = String> {
    prop_oneof![Just("a".to_string()), Just("b".to_string()), Just("c".to_string())]
}

fn arb_source_event() -> impl Strategy<Value = SourceEvent> {
    prop_oneof![
        3 => arb_id().prop_map(|id| SourceEvent::TextStart { id }),
        6 => (arb_id(), "[a-z ]{0,4}").prop_map(|(id, delta)| SourceEvent::TextDelta { id, delta }),
        3 => arb_id().prop_map(|id| SourceEvent::TextEnd { id }),
        1 => arb_id().prop_map(|id| SourceEvent::Custom { id, data: serde_json::json!({ "k": 1 }) }),
        1 => "[a-z_]{1,8}".prop_map(|name| SourceEvent::ToolCall { name }),
        1 => "[a-z]{1,8}".prop_map(|message| SourceEvent::ToolError { message }),
        1 => "[a-z]{1,8}".prop_map(|message| SourceEvent::Failed { message }),
    ]
}

fn run(events: Vec<SourceEvent>) -> Vec<StreamEvent> {
    let mut mux = Multiplexer::with_status_id("status");
    let mut out = mux.start();
    for event in events {
        out.extend(mux.push(event));
    }
    out.extend(mux.finish().0);
    out
}

fn status_of(event: &StreamEvent) -> Option<StatusKind> {
    match event {
        StreamEvent::DataStatus { data, .. } => Some(data.status),
        _ => None,
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn prop_text_segments_are_well_formed(events in proptest::collection::vec(arb_source_event(), 0..30)) {
        let out = run(events);
        let mut open: HashSet<String> = HashSet::new();
        let mut ended: HashSet<String> = HashSet::new();

        for event in &out {
            match event {
                StreamEvent::TextStart { id } => {
                    prop_assert!(!ended.contains(id), "start after end for {id}");
                    prop_assert!(open.insert(id.clone()), "double start for {id}");
                }
                StreamEvent::TextDelta { id, .. } => {
                    prop_assert!(open.contains(id), "delta outside start/end for {id}");
                }
                StreamEvent::TextEnd { id } => {
                    prop_assert!(open.remove(id), "end without start for {id}");
                    ended.insert(id.clone());
                }
                StreamEvent::DataStatus { id, .. } => prop_assert_eq!(id.as_str(), "status"),
                StreamEvent::DataCustom { .. } => {}
            }
        }
        prop_assert!(open.is_empty(), "left open: {open:?}");
    }

    #[test]
    fn prop_status_order(events in proptest::collection::vec(arb_source_event(), 0..30)) {
        let out = run(events);
        let statuses: Vec<StatusKind> = out.iter().filter_map(status_of).collect();

        prop_assert_eq!(statuses.first(), Some(&StatusKind::Started));
        prop_assert!(matches!(statuses.last(), Some(StatusKind::Completed | StatusKind::Error)));
        prop_assert_eq!(status_of(&out[0]), Some(StatusKind::Started));
        prop_assert!(status_of(&out[out.len() - 1]).is_some());

        let first_chunks = statuses.iter().filter(|s| **s == StatusKind::FirstChunk).count();
        prop_assert!(first_chunks <= 1);
        let terminal = statuses
            .iter()
            .filter(|s| matches!(s, StatusKind::Completed | StatusKind::Error))
            .count();
        prop_assert_eq!(terminal, 1);
    }

    #[test]
    fn prop_first_chunk_precedes_first_source_text(
        events in proptest::collection::vec(arb_source_event(), 0..30),
    ) {
        let source_ids = ["a", "b", "c"];
        let out = run(events);
        let first_text = out.iter().position(|e| matches!(
            e,
            StreamEvent::TextDelta { id, delta } if !delta.is_empty() && source_ids.contains(&id.as_str())
        ));
        let first_chunk = out.iter().position(|e| status_of(e) == Some(StatusKind::FirstChunk));

        match (first_text, first_chunk) {
            (Some(text), Some(chunk)) => prop_assert!(chunk < text),
            (Some(_), None) => prop_assert!(false, "text without first chunk status"),
            (None, Some(_)) => prop_assert!(false, "first chunk status without text"),
            (None, None) => {}
        }
    }

    #[test]
    fn prop_output_always_has_visible_text(events in proptest::collection::vec(arb_source_event(), 0..30)) {
        let out = run(events);
        let has_visible_text = out.iter().any(|e| matches!(
            e,
            StreamEvent::TextDelta { delta, .. } if !delta.is_empty()
        ));
        prop_assert!(has_visible_text);
    }

    #[test]
    fn prop_per_id_delta_order_preserved(
        events in proptest::collection::vec(arb_source_event(), 0..30),
    ) {
        // Deltas count until their id is ended; an end only closes an open id
        let expected = {
            let mut open: HashSet<&str> = HashSet::new();
            let mut ended: HashSet<&str> = HashSet::new();
            let mut expected: Vec<(String, String)> = Vec::new();
            for event in &events {
                match event {
                    SourceEvent::TextStart { id } if !ended.contains(id.as_str()) => {
                        open.insert(id);
                    }
                    SourceEvent::TextDelta { id, delta } if !ended.contains(id.as_str()) => {
                        open.insert(id);
                        expected.push((id.clone(), delta.clone()));
                    }
                    SourceEvent::TextEnd { id } if open.remove(id.as_str()) => {
                        ended.insert(id);
                    }
                    _ => {}
                }
            }
            expected
        };
        let out = run(events);
        let source_ids = ["a", "b", "c"];
        let actual: Vec<(String, String)> = out
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TextDelta { id, delta } if source_ids.contains(&id.as_str()) => {
                    Some((id.clone(), delta.clone()))
                }
                _ => None,
            })
            .collect();
        prop_assert_eq!(actual, expected);
    }
}
