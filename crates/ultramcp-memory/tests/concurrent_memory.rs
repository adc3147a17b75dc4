//! Concurrency tests: message indexing and file deduplication under
//! parallel writers

use std::collections::HashSet;
use tempfile::TempDir;
use ultramcp_memory::{MemoryStore, MessageRole, NewFile};

#[tokio::test]
async fn parallel_add_message_produces_dense_unique_indices() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(&dir.path().join("memory.db")).await.unwrap();
    let session = store.get_or_create_session(None, None).await.unwrap();

    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|content| {
            let store = store.clone();
            let session_id = session.id.clone();
            tokio::spawn(async move {
                store
                    .add_message(&session_id, MessageRole::User, content, None, None, None)
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let messages = store.messages(&session.id).await.unwrap();
    let indices: HashSet<i64> = messages.iter().map(|m| m.message_index).collect();

    assert_eq!(messages.len(), 3);
    assert_eq!(indices, HashSet::from([0, 1, 2]));
}

#[tokio::test]
async fn parallel_add_files_never_duplicates_content() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(&dir.path().join("memory.db")).await.unwrap();
    let session = store.get_or_create_session(None, None).await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let session_id = session.id.clone();
            tokio::spawn(async move {
                store
                    .add_files(
                        &session_id,
                        &[NewFile {
                            path: "/shared.ts".to_string(),
                            content: "SHARED CONTENT".to_string(),
                        }],
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let files = store.files(&session.id).await.unwrap();
    assert_eq!(files.len(), 1);
    // One insert, three dedup bumps
    assert_eq!(files[0].access_count, 3);
}
