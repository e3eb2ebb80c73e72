//! Scenarios shared by the memory and Postgres integration tests.
//!
//! Each scenario expects an empty store and leaves data behind; callers clear
//! between scenarios.

#![allow(dead_code)]

use agora::{
    Agora, Cursor, Error, NewForum, NewPost, NewThread, Post, PostId, PostsRequest, SortMode,
    StatusCode, Store, Thread, ThreadRef, ThreadUpdate, User,
};

pub async fn seed<S: Store>(agora: &Agora<S>) -> Thread {
    for nickname in ["alice", "bob", "carol"] {
        agora
            .create_user(User::new(nickname, format!("{nickname}@example.com")))
            .await
            .unwrap();
    }
    agora
        .create_forum(NewForum::new("rust", "Rust", "alice"))
        .await
        .unwrap();
    agora
        .create_thread(NewThread::new("rust", "alice", "Lifetimes", "help").slug("lifetimes"))
        .await
        .unwrap()
        .into_inner()
}

pub async fn post<S: Store>(agora: &Agora<S>, thread: &ThreadRef, posts: Vec<NewPost>) -> Vec<Post> {
    agora.create_posts(thread, posts).await.unwrap()
}

/// Four batches giving four roots, replies up to depth four, and a late
/// reply deep inside an early subtree.
pub async fn forest<S: Store>(agora: &Agora<S>, thread: &ThreadRef) -> Vec<Post> {
    let roots = post(
        agora,
        thread,
        vec![
            NewPost::root("alice", "r1"),
            NewPost::root("bob", "r2"),
            NewPost::root("carol", "r3"),
        ],
    )
    .await;
    let replies = post(
        agora,
        thread,
        vec![
            NewPost::new(roots[0].id, "bob", "r1.a"),
            NewPost::new(roots[0].id, "carol", "r1.b"),
            NewPost::new(roots[2].id, "alice", "r3.a"),
        ],
    )
    .await;
    let nested = post(
        agora,
        thread,
        vec![
            NewPost::new(replies[0].id, "alice", "r1.a.x"),
            NewPost::new(replies[2].id, "bob", "r3.a.x"),
        ],
    )
    .await;
    let late = post(
        agora,
        thread,
        vec![
            NewPost::root("alice", "r4"),
            NewPost::new(nested[0].id, "carol", "r1.a.x.y"),
            NewPost::new(roots[1].id, "alice", "r2.a"),
        ],
    )
    .await;
    [roots, replies, nested, late].concat()
}

pub fn ids(posts: &[Post]) -> Vec<PostId> {
    posts.iter().map(|p| p.id).collect()
}

/// Follow `next_cursor` until an empty page.
pub async fn all_pages<S: Store>(
    agora: &Agora<S>,
    thread: &ThreadRef,
    sort: SortMode,
    desc: bool,
    limit: u32,
) -> Vec<Post> {
    let mut collected = Vec::new();
    let mut since: Option<Cursor> = None;
    loop {
        let mut req = PostsRequest::new(thread.clone())
            .sort(sort)
            .desc(desc)
            .limit(limit);
        if let Some(cursor) = since.take() {
            req = req.since(cursor);
        }
        let page = agora.thread_posts(&req).await.unwrap();
        if page.posts.is_empty() {
            assert!(page.next_cursor.is_none());
            return collected;
        }
        assert!(collected.len() <= 1000, "pagination does not terminate");
        collected.extend(page.posts);
        since = page.next_cursor;
    }
}

pub async fn root_posts_get_own_paths<S: Store>(agora: &Agora<S>) {
    let thread = seed(agora).await;
    let before = agora.get_forum("rust").await.unwrap().posts;

    let posts = post(
        agora,
        &ThreadRef::Id(thread.id),
        vec![NewPost::root("alice", "one"), NewPost::root("bob", "two")],
    )
    .await;

    assert_eq!(posts.len(), 2);
    for p in &posts {
        assert_eq!(p.path.as_slice(), &[p.id]);
        assert_eq!(p.thread, thread.id);
        assert_eq!(p.forum, "rust");
        assert!(!p.is_edited);
    }
    assert!(posts[0].id < posts[1].id);
    assert_eq!(posts[0].created, posts[1].created);
    assert_eq!(agora.get_forum("rust").await.unwrap().posts, before + 2);
}

pub async fn replies_extend_parent_path<S: Store>(agora: &Agora<S>) {
    let thread = seed(agora).await;
    let posts = forest(agora, &ThreadRef::Id(thread.id)).await;
    for p in &posts {
        if p.is_root() {
            assert_eq!(p.path.as_slice(), &[p.id]);
            continue;
        }
        let parent = posts.iter().find(|q| q.id == p.parent).unwrap();
        assert_eq!(p.path, parent.path.child(p.id));
    }
    let stored = agora
        .get_post(posts[10].id, Default::default())
        .await
        .unwrap();
    assert_eq!(stored.post, posts[10]);
}

pub async fn mismatched_parent_writes_nothing<S: Store>(agora: &Agora<S>) {
    let first = seed(agora).await;
    let other = agora
        .create_thread(NewThread::new("rust", "bob", "Traits", "q").slug("traits"))
        .await
        .unwrap()
        .into_inner();
    let foreign = post(agora, &ThreadRef::Id(other.id), vec![NewPost::root("bob", "x")]).await;
    let counter = agora.get_forum("rust").await.unwrap().posts;

    let err = agora
        .create_posts(
            &ThreadRef::Id(first.id),
            vec![
                NewPost::root("alice", "fine"),
                NewPost::new(foreign[0].id, "alice", "wrong thread"),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Path(_)), "{err:?}");
    assert_eq!(err.status(), StatusCode::Conflict);

    let err = agora
        .create_posts(
            &ThreadRef::Id(first.id),
            vec![NewPost::new(999_999, "alice", "no such parent")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingParent { parent: 999_999, .. }));

    let err = agora
        .create_posts(
            &ThreadRef::Id(first.id),
            vec![NewPost::root("mallory", "who")],
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NotFound);

    assert_eq!(agora.get_forum("rust").await.unwrap().posts, counter);
    let listed = all_pages(agora, &ThreadRef::Id(first.id), SortMode::Flat, false, 10).await;
    assert!(listed.is_empty());
}

pub async fn votes_are_replaced_not_added<S: Store>(agora: &Agora<S>) {
    let thread = seed(agora).await;
    let by_slug = ThreadRef::Slug("lifetimes".into());

    assert_eq!(agora.vote(&by_slug, "alice", 1).await.unwrap().votes, 1);
    assert_eq!(agora.vote(&by_slug, "alice", -1).await.unwrap().votes, -1);
    // A second row for alice would leave the sum at 1 here.
    let voted = agora.vote(&ThreadRef::Id(thread.id), "bob", 1).await.unwrap();
    assert_eq!(voted.votes, 0);
    assert_eq!(agora.get_thread(&by_slug).await.unwrap().votes, 0);

    let err = agora.vote(&by_slug, "nobody", 1).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NotFound);
    let err = agora.vote(&"missing".into(), "alice", 1).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NotFound);
}

pub async fn pages_concatenate<S: Store>(agora: &Agora<S>) {
    let thread = ThreadRef::Id(seed(agora).await.id);
    let posts = forest(agora, &thread).await;

    let mut by_id = posts.clone();
    by_id.sort_by_key(|p| p.id);
    let mut by_path = posts.clone();
    by_path.sort_by(|a, b| a.path.cmp(&b.path));
    let mut by_root_desc = by_path.clone();
    by_root_desc.sort_by(|a, b| b.path.root_id().cmp(&a.path.root_id()));

    for limit in [1, 2, 3, 100] {
        let flat = all_pages(agora, &thread, SortMode::Flat, false, limit).await;
        assert_eq!(ids(&flat), ids(&by_id), "flat limit {limit}");

        let flat_desc = all_pages(agora, &thread, SortMode::Flat, true, limit).await;
        let mut reversed = ids(&by_id);
        reversed.reverse();
        assert_eq!(ids(&flat_desc), reversed, "flat desc limit {limit}");

        let tree = all_pages(agora, &thread, SortMode::Tree, false, limit).await;
        assert_eq!(ids(&tree), ids(&by_path), "tree limit {limit}");

        let tree_desc = all_pages(agora, &thread, SortMode::Tree, true, limit).await;
        let mut reversed = ids(&by_path);
        reversed.reverse();
        assert_eq!(ids(&tree_desc), reversed, "tree desc limit {limit}");

        let parent_tree = all_pages(agora, &thread, SortMode::ParentTree, false, limit).await;
        assert_eq!(ids(&parent_tree), ids(&by_path), "parent_tree limit {limit}");

        let parent_tree_desc = all_pages(agora, &thread, SortMode::ParentTree, true, limit).await;
        assert_eq!(
            ids(&parent_tree_desc),
            ids(&by_root_desc),
            "parent_tree desc limit {limit}"
        );
    }
}

pub async fn parent_tree_limits_roots_not_rows<S: Store>(agora: &Agora<S>) {
    let thread = ThreadRef::Id(seed(agora).await.id);
    let posts = forest(agora, &thread).await;
    let page = agora
        .thread_posts(&PostsRequest::new(thread.clone()).sort(SortMode::ParentTree).limit(1))
        .await
        .unwrap();
    // r1 and its four descendants
    assert_eq!(page.posts.len(), 5);
    assert!(page.posts.iter().all(|p| p.path.root_id() == Some(posts[0].id)));
    assert_eq!(page.next_cursor, Some(Cursor::Post(posts[0].id)));

    // A reply id as cursor resumes after its root.
    let deep = posts.iter().find(|p| p.message == "r1.a.x.y").unwrap();
    let page = agora
        .thread_posts(
            &PostsRequest::new(thread.clone())
                .sort(SortMode::ParentTree)
                .since(Cursor::Post(deep.id))
                .limit(1),
        )
        .await
        .unwrap();
    assert_eq!(page.posts[0].message, "r2");
}

pub async fn unknown_cursor_gives_empty_page<S: Store>(agora: &Agora<S>) {
    let thread = ThreadRef::Id(seed(agora).await.id);
    forest(agora, &thread).await;
    for sort in [SortMode::Tree, SortMode::ParentTree] {
        let page = agora
            .thread_posts(
                &PostsRequest::new(thread.clone())
                    .sort(sort)
                    .since(Cursor::Post(424_242)),
            )
            .await
            .unwrap();
        assert!(page.posts.is_empty(), "{sort}");
    }
}

pub async fn edits_and_thread_updates<S: Store>(agora: &Agora<S>) {
    let thread = seed(agora).await;
    let posts = post(agora, &ThreadRef::Id(thread.id), vec![NewPost::root("bob", "orig")]).await;
    let id = posts[0].id;

    let same = agora.update_post(id, Some("orig")).await.unwrap();
    assert!(!same.is_edited);
    let none = agora.update_post(id, None).await.unwrap();
    assert!(!none.is_edited);
    let edited = agora.update_post(id, Some("changed")).await.unwrap();
    assert!(edited.is_edited);
    assert_eq!(edited.message, "changed");
    assert!(matches!(
        agora.update_post(999_999, Some("x")).await,
        Err(Error::PostNotFound(999_999))
    ));

    let by_slug = ThreadRef::Slug("lifetimes".into());
    let untouched = agora
        .update_thread(&by_slug, &ThreadUpdate::default())
        .await
        .unwrap();
    assert_eq!(untouched, thread);
    let renamed = agora
        .update_thread(
            &by_slug,
            &ThreadUpdate {
                title: Some("Lifetimes, again".into()),
                message: Some(String::new()),
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.title, "Lifetimes, again");
    assert_eq!(renamed.message, "help");
}

pub async fn duplicate_creates_return_existing<S: Store>(agora: &Agora<S>) {
    let thread = seed(agora).await;

    let again = agora
        .create_thread(NewThread::new("rust", "bob", "Other", "x").slug("lifetimes"))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::Conflict);
    assert_eq!(again.into_inner(), thread);

    let unslugged = agora
        .create_thread(NewThread::new("rust", "bob", "Anonymous", "x").slug(""))
        .await
        .unwrap();
    assert!(unslugged.is_created());
    assert_eq!(unslugged.get().slug, None);

    let user = agora
        .create_user(User::new("dave", "alice@example.com"))
        .await
        .unwrap();
    assert!(!user.is_created());
    assert_eq!(user.get().nickname, "alice");

    let forum = agora
        .create_forum(NewForum::new("rust", "Rust again", "bob"))
        .await
        .unwrap();
    assert!(!forum.is_created());
    assert_eq!(forum.get().user, "alice");
    assert_eq!(forum.get().threads, 2);

    let err = agora
        .create_thread(NewThread::new("go", "alice", "Wrong forum", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ForumNotFound(_)));
}
