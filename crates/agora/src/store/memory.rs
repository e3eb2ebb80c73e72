//! In-process store.
//!
//! All tables sit behind one mutex. Every operation takes the lock once and
//! never awaits while holding it, which makes each operation atomic and
//! serializes concurrent writers the way a table lock would.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::model::{
    Forum, Insert, NewForum, NewPost, NewThread, Path, Post, PostId, Thread, ThreadId, ThreadRef,
    ThreadUpdate, User, now,
};
use crate::path::{ParentRow, allocate_batch, parent_ids};
use crate::plan::{ForumThreadsRequest, PathBound, PostQuery, Predicate, compare_posts};
use crate::store::Store;
use crate::vote::{Ballots, Voice};

/// Store that keeps everything in memory. Used by tests and by embedders that
/// do not need persistence.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    forums: HashMap<String, Forum>,
    threads: BTreeMap<ThreadId, Thread>,
    slugs: HashMap<String, ThreadId>,
    posts: BTreeMap<PostId, Post>,
    ballots: Ballots,
    last_thread_id: ThreadId,
    last_post_id: PostId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic mid-operation cannot leave a half-written batch behind:
        // writes happen only after every check has passed.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of vote rows stored for a thread.
    pub fn vote_rows(&self, thread: ThreadId) -> usize {
        self.lock().ballots.rows(thread)
    }

    /// Number of posts stored, across all threads.
    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }
}

impl Tables {
    fn thread_id(&self, thread: &ThreadRef) -> Result<ThreadId> {
        let id = match thread {
            ThreadRef::Id(id) => self.threads.contains_key(id).then_some(*id),
            ThreadRef::Slug(slug) => self.slugs.get(slug).copied(),
        };
        id.ok_or_else(|| Error::ThreadNotFound(thread.clone()))
    }

    fn thread(&self, thread: &ThreadRef) -> Result<&Thread> {
        let id = self.thread_id(thread)?;
        self.threads
            .get(&id)
            .ok_or_else(|| Error::ThreadNotFound(thread.clone()))
    }

    fn thread_mut(&mut self, thread: &ThreadRef) -> Result<&mut Thread> {
        let id = self.thread_id(thread)?;
        self.threads
            .get_mut(&id)
            .ok_or_else(|| Error::ThreadNotFound(thread.clone()))
    }

    fn user(&self, nickname: &str) -> Result<&User> {
        self.users
            .get(nickname)
            .ok_or_else(|| Error::UserNotFound(nickname.to_owned()))
    }

    fn forum(&self, slug: &str) -> Result<&Forum> {
        self.forums
            .get(slug)
            .ok_or_else(|| Error::ForumNotFound(slug.to_owned()))
    }

    fn path_bound<'a>(&'a self, bound: &'a PathBound) -> Option<&'a Path> {
        match bound {
            PathBound::Literal(path) => Some(path),
            PathBound::OfPost(id) => self.posts.get(id).map(|p| &p.path),
        }
    }

    fn matches(&self, predicate: &Predicate, post: &Post) -> bool {
        match predicate {
            Predicate::IdAfter(id) => post.id > *id,
            Predicate::IdBefore(id) => post.id < *id,
            Predicate::PathAfter(bound) => self.path_bound(bound).is_some_and(|p| post.path > *p),
            Predicate::PathBefore(bound) => self.path_bound(bound).is_some_and(|p| post.path < *p),
        }
    }

    fn select_posts(&self, query: &PostQuery) -> Vec<Post> {
        let in_thread = || self.posts.values().filter(|p| p.thread == query.thread);

        let roots: Option<HashSet<PostId>> = query.roots.as_ref().map(|sel| {
            // `Some(None)`: the cursor names an unknown post, nothing follows it.
            let bound = sel
                .after
                .map(|id| self.posts.get(&id).and_then(|p| p.path.root_id()));
            let mut ids: Vec<PostId> = in_thread()
                .filter(|p| p.is_root())
                .map(|p| p.id)
                .filter(|id| match bound {
                    None => true,
                    Some(None) => false,
                    Some(Some(b)) if sel.desc => *id < b,
                    Some(Some(b)) => *id > b,
                })
                .collect();
            ids.sort_unstable();
            if sel.desc {
                ids.reverse();
            }
            ids.truncate(sel.limit as usize);
            ids.into_iter().collect()
        });

        let mut posts: Vec<Post> = in_thread()
            .filter(|p| match &roots {
                Some(roots) => p.path.root_id().is_some_and(|r| roots.contains(&r)),
                None => true,
            })
            .filter(|p| query.filter.iter().all(|pred| self.matches(pred, p)))
            .cloned()
            .collect();
        posts.sort_by(|a, b| compare_posts(&query.order, a, b));
        if let Some(limit) = query.limit {
            posts.truncate(limit as usize);
        }
        posts
    }
}

impl Store for MemoryStore {
    async fn create_user(&self, user: User) -> Result<Insert<User>> {
        let mut tables = self.lock();
        if let Some(existing) = tables.users.get(&user.nickname) {
            return Ok(Insert::Existing(existing.clone()));
        }
        if let Some(existing) = tables.users.values().find(|u| u.email == user.email) {
            return Ok(Insert::Existing(existing.clone()));
        }
        tables.users.insert(user.nickname.clone(), user.clone());
        Ok(Insert::Created(user))
    }

    async fn get_user(&self, nickname: &str) -> Result<User> {
        self.lock().user(nickname).cloned()
    }

    async fn create_forum(&self, forum: NewForum) -> Result<Insert<Forum>> {
        let mut tables = self.lock();
        let owner = tables.user(&forum.user)?.nickname.clone();
        if let Some(existing) = tables.forums.get(&forum.slug) {
            return Ok(Insert::Existing(existing.clone()));
        }
        let forum = Forum {
            slug: forum.slug,
            title: forum.title,
            user: owner,
            threads: 0,
            posts: 0,
        };
        tables.forums.insert(forum.slug.clone(), forum.clone());
        Ok(Insert::Created(forum))
    }

    async fn get_forum(&self, slug: &str) -> Result<Forum> {
        self.lock().forum(slug).cloned()
    }

    async fn create_thread(&self, thread: NewThread) -> Result<Insert<Thread>> {
        let mut tables = self.lock();
        let author = tables.user(&thread.author)?.nickname.clone();
        let forum = tables.forum(&thread.forum)?.slug.clone();
        let slug = thread.stored_slug().map(str::to_owned);

        if let Some(slug) = &slug {
            if let Some(id) = tables.slugs.get(slug) {
                if let Some(existing) = tables.threads.get(id) {
                    return Ok(Insert::Existing(existing.clone()));
                }
            }
        }

        tables.last_thread_id += 1;
        let created = Thread {
            id: tables.last_thread_id,
            title: thread.title,
            author,
            forum: forum.clone(),
            message: thread.message,
            votes: 0,
            slug,
            created: thread.created.unwrap_or_else(now),
        };
        if let Some(slug) = &created.slug {
            tables.slugs.insert(slug.clone(), created.id);
        }
        tables.threads.insert(created.id, created.clone());
        if let Some(forum) = tables.forums.get_mut(&forum) {
            forum.threads += 1;
        }
        Ok(Insert::Created(created))
    }

    async fn get_thread(&self, thread: &ThreadRef) -> Result<Thread> {
        self.lock().thread(thread).cloned()
    }

    async fn update_thread(&self, thread: &ThreadRef, update: &ThreadUpdate) -> Result<Thread> {
        let mut tables = self.lock();
        let thread = tables.thread_mut(thread)?;
        if let Some(title) = update.title() {
            thread.title = title.to_owned();
        }
        if let Some(message) = update.message() {
            thread.message = message.to_owned();
        }
        Ok(thread.clone())
    }

    async fn forum_threads(&self, req: &ForumThreadsRequest, limit: u32) -> Result<Vec<Thread>> {
        let tables = self.lock();
        let forum = tables.forum(&req.forum)?;
        let mut threads: Vec<Thread> = tables
            .threads
            .values()
            .filter(|t| t.forum == forum.slug)
            .filter(|t| match req.since {
                None => true,
                Some(since) if req.desc => t.created <= since,
                Some(since) => t.created >= since,
            })
            .cloned()
            .collect();
        threads.sort_by(|a, b| {
            let ord = a.created.cmp(&b.created).then(a.id.cmp(&b.id));
            if req.desc { ord.reverse() } else { ord }
        });
        threads.truncate(limit as usize);
        Ok(threads)
    }

    async fn create_posts(&self, thread: &ThreadRef, posts: Vec<NewPost>) -> Result<Vec<Post>> {
        let mut tables = self.lock();
        let (thread, forum) = {
            let thread = tables.thread(thread)?;
            (thread.id, thread.forum.clone())
        };
        if posts.is_empty() {
            return Ok(Vec::new());
        }
        for post in &posts {
            tables.user(&post.author)?;
        }

        let parents: HashMap<PostId, ParentRow> = parent_ids(&posts)
            .into_iter()
            .filter_map(|id| {
                tables.posts.get(&id).map(|p| {
                    let row = ParentRow {
                        id,
                        thread: p.thread,
                        path: p.path.clone(),
                    };
                    (id, row)
                })
            })
            .collect();
        let first = tables.last_post_id + 1;
        let ids: Vec<PostId> = (first..first + posts.len() as PostId).collect();
        let paths = allocate_batch(&posts, &parents, thread, &ids)?;

        // Everything is validated; from here on the batch is written whole.
        let created = now();
        let count = posts.len();
        let inserted: Vec<Post> = posts
            .into_iter()
            .zip(ids)
            .zip(paths)
            .map(|((post, id), path)| Post {
                id,
                parent: post.parent,
                author: post.author,
                forum: forum.clone(),
                thread,
                message: post.message,
                is_edited: false,
                created,
                path,
            })
            .collect();
        tables.last_post_id += count as PostId;
        for post in &inserted {
            tables.posts.insert(post.id, post.clone());
        }
        if let Some(forum) = tables.forums.get_mut(&forum) {
            forum.posts += count as i64;
        }
        Ok(inserted)
    }

    async fn get_post(&self, id: PostId) -> Result<Post> {
        self.lock()
            .posts
            .get(&id)
            .cloned()
            .ok_or(Error::PostNotFound(id))
    }

    async fn update_post(&self, id: PostId, message: Option<&str>) -> Result<Post> {
        let mut tables = self.lock();
        let post = tables.posts.get_mut(&id).ok_or(Error::PostNotFound(id))?;
        match message {
            Some(message) if !message.is_empty() && message != post.message => {
                post.message = message.to_owned();
                post.is_edited = true;
            }
            _ => {}
        }
        Ok(post.clone())
    }

    async fn thread_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        Ok(self.lock().select_posts(query))
    }

    async fn vote(&self, thread: &ThreadRef, nickname: &str, voice: Voice) -> Result<Thread> {
        let mut tables = self.lock();
        let id = tables.thread_id(thread)?;
        let author = tables.user(nickname)?.nickname.clone();
        let score = tables.ballots.cast(id, &author, voice);
        let thread = tables.thread_mut(thread)?;
        thread.votes = score;
        Ok(thread.clone())
    }

    async fn clear(&self) -> Result<()> {
        *self.lock() = Tables::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::plan::{Planner, PostsRequest, SortMode};

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_user(User::new("alice", "a@example.com")).await.unwrap();
        store.create_user(User::new("bob", "b@example.com")).await.unwrap();
        store
            .create_forum(NewForum::new("rust", "Rust", "alice"))
            .await
            .unwrap();
        store
            .create_thread(NewThread::new("rust", "alice", "Lifetimes", "help").slug("lifetimes"))
            .await
            .unwrap();
        store
    }

    fn ids(posts: &[Post]) -> Vec<PostId> {
        posts.iter().map(|p| p.id).collect()
    }

    #[tokio::test]
    async fn test_thread_by_slug_and_id() {
        let store = seeded().await;
        let by_slug = store.get_thread(&"lifetimes".into()).await.unwrap();
        let by_id = store.get_thread(&ThreadRef::Id(by_slug.id)).await.unwrap();
        assert_eq!(by_slug, by_id);
        assert!(matches!(
            store.get_thread(&"missing".into()).await,
            Err(Error::ThreadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_slug_returns_existing() {
        let store = seeded().await;
        let again = store
            .create_thread(NewThread::new("rust", "bob", "Other", "text").slug("lifetimes"))
            .await
            .unwrap();
        assert!(!again.is_created());
        assert_eq!(again.get().author, "alice");
        assert_eq!(store.get_forum("rust").await.unwrap().threads, 1);
    }

    #[tokio::test]
    async fn test_empty_slugs_do_not_collide() {
        let store = seeded().await;
        for _ in 0..2 {
            let created = store
                .create_thread(NewThread::new("rust", "bob", "No slug", "x").slug(""))
                .await
                .unwrap();
            assert!(created.is_created());
            assert_eq!(created.get().slug, None);
        }
    }

    #[tokio::test]
    async fn test_nested_paths() {
        let store = seeded().await;
        let thread: ThreadRef = "lifetimes".into();
        let roots = store
            .create_posts(&thread, vec![NewPost::root("alice", "a"), NewPost::root("bob", "b")])
            .await
            .unwrap();
        let replies = store
            .create_posts(&thread, vec![NewPost::new(roots[0].id, "bob", "re: a")])
            .await
            .unwrap();
        let deeper = store
            .create_posts(&thread, vec![NewPost::new(replies[0].id, "alice", "re: re: a")])
            .await
            .unwrap();
        assert_eq!(roots[0].path.as_slice(), &[1]);
        assert_eq!(roots[1].path.as_slice(), &[2]);
        assert_eq!(replies[0].path.as_slice(), &[1, 3]);
        assert_eq!(deeper[0].path.as_slice(), &[1, 3, 4]);
        assert_eq!(store.get_forum("rust").await.unwrap().posts, 4);
    }

    #[tokio::test]
    async fn test_batch_shares_created() {
        let store = seeded().await;
        let posts = store
            .create_posts(
                &"lifetimes".into(),
                vec![NewPost::root("alice", "1"), NewPost::root("alice", "2")],
            )
            .await
            .unwrap();
        assert_eq!(posts[0].created, posts[1].created);
        assert_eq!(posts[0].forum, "rust");
    }

    #[tokio::test]
    async fn test_unknown_author_writes_nothing() {
        let store = seeded().await;
        let err = store
            .create_posts(
                &"lifetimes".into(),
                vec![NewPost::root("alice", "ok"), NewPost::root("carol", "who")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UserNotFound(ref n) if n == "carol"));
        assert_eq!(store.post_count(), 0);
    }

    #[tokio::test]
    async fn test_update_post_edit_flag() {
        let store = seeded().await;
        let post = store
            .create_posts(&"lifetimes".into(), vec![NewPost::root("alice", "hello")])
            .await
            .unwrap()
            .remove(0);

        let same = store.update_post(post.id, Some("hello")).await.unwrap();
        assert!(!same.is_edited);
        let empty = store.update_post(post.id, Some("")).await.unwrap();
        assert!(!empty.is_edited);
        let edited = store.update_post(post.id, Some("hi")).await.unwrap();
        assert!(edited.is_edited);
        assert_eq!(edited.message, "hi");
        assert!(matches!(
            store.update_post(999, Some("x")).await,
            Err(Error::PostNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_update_thread_ignores_empty_fields() {
        let store = seeded().await;
        let update = ThreadUpdate {
            title: Some("Borrowck".into()),
            message: Some(String::new()),
        };
        let thread = store
            .update_thread(&"lifetimes".into(), &update)
            .await
            .unwrap();
        assert_eq!(thread.title, "Borrowck");
        assert_eq!(thread.message, "help");
    }

    #[tokio::test]
    async fn test_unknown_cursor_post_yields_empty_tree_page() {
        let store = seeded().await;
        let thread = store.get_thread(&"lifetimes".into()).await.unwrap();
        store
            .create_posts(&"lifetimes".into(), vec![NewPost::root("alice", "a")])
            .await
            .unwrap();
        let req = PostsRequest::new(thread.id).sort(SortMode::Tree).since(Cursor::Post(77));
        let query = Planner::default().plan(&req, thread.id).unwrap();
        assert!(store.thread_posts(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tree_page_after_literal_path() {
        let store = seeded().await;
        let thread = store.get_thread(&"lifetimes".into()).await.unwrap();
        let tref = ThreadRef::Id(thread.id);
        let roots = store
            .create_posts(&tref, vec![NewPost::root("alice", "a"), NewPost::root("bob", "b")])
            .await
            .unwrap();
        let reply = store
            .create_posts(&tref, vec![NewPost::new(roots[0].id, "bob", "re: a")])
            .await
            .unwrap()
            .remove(0);

        let planner = Planner::default();
        let after = Cursor::Path(roots[0].path.clone());
        let asc = planner
            .plan(&PostsRequest::new(thread.id).sort(SortMode::Tree).since(after.clone()), thread.id)
            .unwrap();
        assert_eq!(
            ids(&store.thread_posts(&asc).await.unwrap()),
            vec![reply.id, roots[1].id]
        );

        let desc = planner
            .plan(
                &PostsRequest::new(thread.id).sort(SortMode::Tree).since(after).desc(true),
                thread.id,
            )
            .unwrap();
        assert!(store.thread_posts(&desc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parent_tree_pages_by_root() {
        let store = seeded().await;
        let thread = store.get_thread(&"lifetimes".into()).await.unwrap();
        let tref = ThreadRef::Id(thread.id);
        let roots = store
            .create_posts(
                &tref,
                vec![
                    NewPost::root("alice", "r1"),
                    NewPost::root("alice", "r2"),
                    NewPost::root("alice", "r3"),
                ],
            )
            .await
            .unwrap();
        store
            .create_posts(
                &tref,
                vec![
                    NewPost::new(roots[0].id, "bob", "c1"),
                    NewPost::new(roots[2].id, "bob", "c3"),
                ],
            )
            .await
            .unwrap();

        let planner = Planner::default();
        let first = planner
            .plan(
                &PostsRequest::new(thread.id).sort(SortMode::ParentTree).limit(2),
                thread.id,
            )
            .unwrap();
        assert_eq!(ids(&store.thread_posts(&first).await.unwrap()), vec![1, 4, 2]);

        let desc = planner
            .plan(
                &PostsRequest::new(thread.id)
                    .sort(SortMode::ParentTree)
                    .limit(1)
                    .desc(true)
                    .since(Cursor::Post(3)),
                thread.id,
            )
            .unwrap();
        assert_eq!(ids(&store.thread_posts(&desc).await.unwrap()), vec![2]);
    }

    #[tokio::test]
    async fn test_forum_threads_since_is_inclusive() {
        let store = seeded().await;
        let base = now();
        for (i, title) in ["a", "b", "c"].into_iter().enumerate() {
            let mut thread = NewThread::new("rust", "bob", title, "m");
            thread.created = Some(base + chrono::Duration::seconds(i as i64 + 1));
            store.create_thread(thread).await.unwrap();
        }
        let since = base + chrono::Duration::seconds(2);

        let asc = ForumThreadsRequest::new("rust").since(since);
        let titles: Vec<String> = store
            .forum_threads(&asc, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, ["b", "c"]);

        let desc = ForumThreadsRequest::new("rust").since(since).desc(true);
        let titles: Vec<String> = store
            .forum_threads(&desc, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, ["b", "a"]);

        assert!(matches!(
            store.forum_threads(&ForumThreadsRequest::new("go"), 10).await,
            Err(Error::ForumNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_resets_ids() {
        let store = seeded().await;
        store
            .create_posts(&"lifetimes".into(), vec![NewPost::root("alice", "a")])
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.post_count(), 0);
        assert!(store.get_user("alice").await.is_err());
    }
}
