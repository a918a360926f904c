//! Registration from many tasks at once converges on one entry per shape.

use std::sync::Arc;

use modkit_openapi::{Resolution, Schema, SchemaNode, SchemaStore};

fn user() -> SchemaNode {
    Schema::object()
        .with_title("User")
        .with_property("id", Schema::integer().with_format("int64"))
        .with_property("email", Schema::string().with_format("email"))
        .with_required("id")
        .into_node()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registration_yields_one_entry() {
    const TASKS: usize = 64;
    let store = Arc::new(SchemaStore::new());

    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let node = user();
            store.register(&node, None).map(|r| r.key)
        }));
    }

    let mut keys = Vec::new();
    for handle in handles {
        keys.push(handle.await.unwrap().unwrap());
    }

    assert!(keys.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.len(), 1);
    assert_eq!(store.occurrences(&user()), TASKS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_hints_resolve_deterministically() {
    let store = Arc::new(SchemaStore::new());
    let mut set = tokio::task::JoinSet::new();
    for hint in ["Member", "Account", "User", "Person"] {
        let store = store.clone();
        set.spawn_blocking(move || {
            store.populate_named(&user(), Some(hint));
        });
    }
    while let Some(joined) = set.join_next().await {
        joined.unwrap();
    }

    match store.resolve(&user()).unwrap() {
        Resolution::Reference { id, .. } => assert_eq!(id, "Account"),
        Resolution::Inline => panic!("four registrations must produce a reference"),
    }
    // nested shapes were counted once per populate
    let id = Schema::integer().with_format("int64").into_node();
    assert_eq!(store.occurrences(&id), 4);
}
