//! Property-based tests for state merging, routing determinism and
//! checkpoint persistence.
//!
//! These properties must hold for any input text, any sequence of partial
//! updates and any storable state.

use proptest::prelude::*;
use relaygraph::testing::{echo_node, reply_node, user_state};
use relaygraph::{
    CheckpointStore, ClassifierRouter, END, Executor, FileCheckpointStore, Graph,
    InMemoryCheckpointStore, KeywordClassifier, Message, Role, SessionId, State, StateUpdate,
};
use serde_json::{Value, json};

// Text with and without the classifier keywords
fn inquiry_strategy() -> impl Strategy<Value = String> {
    let word = prop_oneof![
        Just("환불".to_string()),
        Just("오류".to_string()),
        Just("제품".to_string()),
        "[a-z가-힣 ]{0,12}",
    ];
    prop::collection::vec(word, 0..6).prop_map(|words| words.join(" "))
}

fn message_strategy() -> impl Strategy<Value = Message> {
    let role = prop_oneof![Just(Role::User), Just(Role::Assistant), Just(Role::Tool)];
    (role, ".{0,40}").prop_map(|(role, content)| Message::new(role, content))
}

// Any JSON value a node can store, finite floats included
fn field_value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Value::from),
        ".{0,24}".prop_map(Value::from),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["status", "summary", "count", "next", "rows"]).prop_map(String::from)
}

fn update_strategy() -> impl Strategy<Value = StateUpdate> {
    (
        prop::collection::vec(message_strategy(), 0..3),
        prop::collection::vec((field_name_strategy(), field_value_strategy()), 0..3),
    )
        .prop_map(|(messages, fields)| {
            fields
                .into_iter()
                .fold(StateUpdate::new().messages(messages), |update, (name, value)| {
                    update.set(name, value)
                })
        })
}

fn state_strategy() -> impl Strategy<Value = State> {
    (
        prop::collection::vec(message_strategy(), 0..6),
        prop::collection::vec((field_name_strategy(), field_value_strategy()), 0..5),
    )
        .prop_map(|(messages, fields)| {
            let state = messages.into_iter().fold(State::new(), State::with_message);
            fields
                .into_iter()
                .fold(state, |state, (name, value)| state.with_field(name, value))
        })
}

fn session_strategy() -> impl Strategy<Value = SessionId> {
    "[a-z0-9][a-z0-9_-]{0,31}".prop_filter_map("Valid session id", |s| s.parse().ok())
}

fn routed_graph() -> Graph {
    let classifier = KeywordClassifier::new("general")
        .rule("payment", ["환불"])
        .rule("tech", ["오류"]);
    Graph::builder("routed")
        .node("classify", echo_node())
        .node("payment", reply_node("payment desk"))
        .node("tech", reply_node("tech desk"))
        .entry("classify")
        .conditional_edge(
            "classify",
            ClassifierRouter::new(classifier),
            [("payment", "payment"), ("tech", "tech"), ("general", END)],
        )
        .edge("payment", END)
        .edge("tech", END)
        .build()
        .unwrap()
}

proptest! {
    /// Property: the same graph on the same input takes the same path and
    /// produces the same state
    #[test]
    fn prop_runs_are_deterministic(text in inquiry_strategy()) {
        tokio_test::block_on(async {
            let graph = routed_graph();
            let executor = Executor::new();

            let first = executor.run(&graph, user_state(&text), None).await;
            let second = executor.run(&graph, user_state(&text), None).await;

            prop_assert!(first.is_completed());
            prop_assert_eq!(&first.path, &second.path);
            prop_assert_eq!(&first.state, &second.state);
            Ok(())
        })?;
    }

    /// Property: the first matching rule decides the route
    #[test]
    fn prop_first_matching_rule_routes(text in inquiry_strategy()) {
        tokio_test::block_on(async {
            let outcome = Executor::new().run(&routed_graph(), user_state(&text), None).await;

            let expected = if text.contains("환불") {
                vec!["classify", "payment"]
            } else if text.contains("오류") {
                vec!["classify", "tech"]
            } else {
                vec!["classify"]
            };
            prop_assert_eq!(outcome.path, expected);
            Ok(())
        })?;
    }

    /// Property: merging only ever appends to history, in order
    #[test]
    fn prop_history_is_append_only(
        initial in state_strategy(),
        updates in prop::collection::vec(update_strategy(), 0..8)
    ) {
        let mut state = initial.clone();
        let mut expected: Vec<Message> = initial.history().to_vec();

        for update in updates {
            let before = state.history().to_vec();
            expected.extend(update.new_messages().iter().cloned());
            state.apply(update);

            prop_assert!(state.history().len() >= before.len());
            prop_assert_eq!(&state.history()[..before.len()], &before[..]);
        }
        prop_assert_eq!(state.history(), &expected[..]);
    }

    /// Property: a merge overwrites the fields it names and keeps the rest
    #[test]
    fn prop_merge_overwrites_named_fields(
        initial in state_strategy(),
        update in update_strategy()
    ) {
        let mut state = initial.clone();
        let changed = update.changed_fields().clone();
        state.apply(update);

        for (name, value) in &changed {
            prop_assert_eq!(state.get(name), Some(value));
        }
        for (name, value) in initial.fields() {
            if !changed.contains_key(name) {
                prop_assert_eq!(state.get(name), Some(value));
            }
        }
    }

    /// Property: what a store saves is what it loads, for every backend
    #[test]
    fn prop_checkpoint_round_trip(
        session in session_strategy(),
        state in state_strategy()
    ) {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let stores: Vec<Box<dyn CheckpointStore>> = vec![
                Box::new(InMemoryCheckpointStore::new()),
                Box::new(FileCheckpointStore::new(dir.path()).unwrap()),
            ];

            for store in stores {
                store.save(&session, &state).await.unwrap();
                let loaded = store.load(&session).await.unwrap();
                prop_assert_eq!(loaded.as_ref(), Some(&state));

                // saving again replaces, never duplicates
                store.save(&session, &state).await.unwrap();
                prop_assert_eq!(store.list().await.unwrap().len(), 1);
            }
            Ok(())
        })?;
    }

    /// Property: a resumed run starts from exactly what the last run saved
    #[test]
    fn prop_resume_extends_saved_history(
        session in session_strategy(),
        first in inquiry_strategy(),
        second in inquiry_strategy()
    ) {
        tokio_test::block_on(async {
            let store = InMemoryCheckpointStore::shared();
            let executor = Executor::new().with_checkpoint_store(store.clone());
            let graph = routed_graph();

            let one = executor.run(&graph, user_state(&first), Some(&session)).await;
            let two = executor.run(&graph, user_state(&second), Some(&session)).await;

            prop_assert!(two.resumed);
            prop_assert_eq!(
                &two.state.history()[..one.state.history().len()],
                one.state.history()
            );
            let loaded = store.load(&session).await.unwrap();
            prop_assert_eq!(
                loaded.as_ref(),
                Some(&two.state)
            );
            Ok(())
        })?;
    }
}

#[test]
fn test_strategies_produce_storable_values() {
    let value = json!({ "rows": [1, "two", null, { "k": true }] });
    let state = State::new().with_field("rows", value.clone());
    let text = serde_json::to_string(&state).unwrap();
    let back: State = serde_json::from_str(&text).unwrap();
    assert_eq!(back.get("rows"), Some(&value));
}
