//! Store scenarios against the in-process store.

mod common;

use agora::{Agora, MemoryStore, NewPost, ThreadRef};

fn agora() -> Agora<MemoryStore> {
    Agora::new(MemoryStore::new())
}

#[tokio::test]
async fn root_posts_get_own_paths() {
    common::root_posts_get_own_paths(&agora()).await;
}

#[tokio::test]
async fn replies_extend_parent_path() {
    common::replies_extend_parent_path(&agora()).await;
}

#[tokio::test]
async fn mismatched_parent_writes_nothing() {
    let agora = agora();
    common::mismatched_parent_writes_nothing(&agora).await;
    // only the post in the other thread
    assert_eq!(agora.store().post_count(), 1);
}

#[tokio::test]
async fn votes_are_replaced_not_added() {
    let agora = agora();
    common::votes_are_replaced_not_added(&agora).await;
    let thread = agora.get_thread(&"lifetimes".into()).await.unwrap();
    assert_eq!(agora.store().vote_rows(thread.id), 2);
}

#[tokio::test]
async fn pages_concatenate() {
    common::pages_concatenate(&agora()).await;
}

#[tokio::test]
async fn parent_tree_limits_roots_not_rows() {
    common::parent_tree_limits_roots_not_rows(&agora()).await;
}

#[tokio::test]
async fn unknown_cursor_gives_empty_page() {
    common::unknown_cursor_gives_empty_page(&agora()).await;
}

#[tokio::test]
async fn edits_and_thread_updates() {
    common::edits_and_thread_updates(&agora()).await;
}

#[tokio::test]
async fn duplicate_creates_return_existing() {
    common::duplicate_creates_return_existing(&agora()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_batches_keep_paths_consistent() {
    let agora = std::sync::Arc::new(agora());
    let thread = ThreadRef::Id(common::seed(&*agora).await.id);
    let roots = common::post(&*agora, &thread, vec![NewPost::root("alice", "root")]).await;
    let root = roots[0].id;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let agora = agora.clone();
        let thread = thread.clone();
        tasks.push(tokio::spawn(async move {
            let batch = (0..10)
                .map(|j| NewPost::new(root, "bob", format!("{i}.{j}")))
                .collect();
            agora.create_posts(&thread, batch).await.unwrap()
        }));
    }
    for task in tasks {
        for post in task.await.unwrap() {
            assert_eq!(post.path.as_slice(), &[root, post.id]);
        }
    }
    assert_eq!(agora.get_forum("rust").await.unwrap().posts, 81);
    assert_eq!(agora.status().post, 81);
}
