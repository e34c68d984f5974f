#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::cache::{self, join_path, normalize_path, parent_path, MediaType, Node, NodeStore, Visibility};
    use crate::query::HiddenSet;
    use crate::source::RemoteEntry;
    use crate::tests::support::memory_pool;

    fn child(id: &str, name: &str, folder: bool, parent_id: &str, parent: &str) -> Node {
        let entry = if folder { RemoteEntry::folder(id, name) } else { RemoteEntry::file(id, name, 10) };
        Node::observed(&entry, parent_id, parent, &HiddenSet::default())
    }

    async fn seeded_store() -> NodeStore {
        let store = NodeStore::new(memory_pool().await);
        let nodes = vec![
            Node::root("r"),
            child("d1", "Docs", true, "r", "/"),
            child("f1", "a.txt", false, "d1", "/Docs"),
            child("d2", "Deep", true, "d1", "/Docs"),
            child("f2", "b.txt", false, "d2", "/Docs/Deep"),
            child("f3", "top.txt", false, "r", "/"),
        ];
        store.upsert("acc", &nodes, 4).await.unwrap();
        store
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("//a///b/"), "/a/b");
        assert_eq!(normalize_path("a/./b"), "/a/b");
        assert_eq!(parent_path("/"), "");
        assert_eq!(parent_path("/a"), "/");
        assert_eq!(parent_path("/a/b"), "/a");
        assert_eq!(join_path("/", "x"), "/x");
        assert_eq!(join_path("/a", "x"), "/a/x");
        assert_eq!(cache::escape_like_pattern("50%_off!"), "50!%!_off!!");
    }

    #[test]
    fn test_observed_node_derives_paths() {
        let entry = RemoteEntry::file("id", "song.flac", 5).modified(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let node = Node::observed(&entry, "p", "/Music", &HiddenSet::parse("id"));
        assert_eq!(node.path, "/Music/song.flac");
        assert_eq!(node.parent_path, "/Music");
        assert_eq!(node.media_type, MediaType::Audio);
        assert!(node.hidden);
        assert!(!node.deleted);
        assert!(!node.is_root());
        assert!(Node::root("r").is_root());
    }

    #[tokio::test]
    async fn test_upsert_and_list_children() {
        let store = seeded_store().await;
        let root_children = store.list_children("acc", "/", Visibility::Visible).await.unwrap();
        let names: Vec<&str> = root_children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Docs", "top.txt"]);

        let root = store.find_by_path("acc", "/", Visibility::Visible).await.unwrap().unwrap();
        assert!(root.is_folder);
        assert_eq!(root.file_id, "r");

        let deep = store.find_by_path("acc", "/Docs/Deep/b.txt", Visibility::Visible).await.unwrap().unwrap();
        assert_eq!(deep.file_id, "f2");
        assert_eq!(store.count_live("acc").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_listing_orders_newest_first_within_kind() {
        let store = NodeStore::new(memory_pool().await);
        let old = RemoteEntry::file("old", "z-old.txt", 1).modified(Utc.timestamp_opt(1_000, 0).unwrap());
        let new = RemoteEntry::file("new", "a-new.txt", 1).modified(Utc.timestamp_opt(2_000, 0).unwrap());
        let dir = RemoteEntry::folder("dir", "zz");
        let hidden = HiddenSet::default();
        let nodes: Vec<Node> = [old, new, dir].iter().map(|e| Node::observed(e, "r", "/", &hidden)).collect();
        store.upsert("acc", &nodes, 80).await.unwrap();

        let ids: Vec<String> = store
            .list_children("acc", "/", Visibility::Visible)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.file_id)
            .collect();
        assert_eq!(ids, vec!["dir", "new", "old"]);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = seeded_store().await;
        let first = store.all_nodes("acc", Visibility::All).await.unwrap();
        let again = vec![child("f1", "a.txt", false, "d1", "/Docs")];
        store.upsert("acc", &again, 80).await.unwrap();
        let second = store.all_nodes("acc", Visibility::All).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_upsert_many_rows_in_small_batches() {
        let store = NodeStore::new(memory_pool().await);
        let nodes: Vec<Node> = (0..250).map(|i| child(&format!("f{}", i), &format!("file{}.txt", i), false, "r", "/")).collect();
        store.upsert("acc", &nodes, 7).await.unwrap();
        assert_eq!(store.count_live("acc").await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_name_collisions_are_kept_apart() {
        let store = NodeStore::new(memory_pool().await);
        let nodes = vec![child("x1", "same.txt", false, "r", "/"), child("x2", "same.txt", false, "r", "/")];
        store.upsert("acc", &nodes, 80).await.unwrap();

        let listed = store.list_children("acc", "/", Visibility::Visible).await.unwrap();
        assert_eq!(listed.len(), 2);
        let found = store.find_by_path("acc", "/same.txt", Visibility::Visible).await.unwrap().unwrap();
        assert_eq!(found.file_id, "x1");
    }

    #[tokio::test]
    async fn test_descendants_and_subtree_tombstones() {
        let store = seeded_store().await;
        let mut ids = store.descendants("acc", "d1").await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["d2", "f1", "f2"]);

        let marked = store.mark_deleted_subtree("acc", "d1", false).await.unwrap();
        assert_eq!(marked, 3);
        assert!(store.list_children("acc", "/Docs", Visibility::Visible).await.unwrap().is_empty());
        assert!(store.find_by_path("acc", "/Docs", Visibility::Visible).await.unwrap().is_some());

        let tomb = store.find_by_id("acc", "f2", Visibility::All).await.unwrap().unwrap();
        assert!(tomb.deleted);
        assert!(store.find_by_id("acc", "f2", Visibility::Live).await.unwrap().is_none());

        // Upserting revives a tombstone
        store.upsert("acc", &[child("f2", "b.txt", false, "d2", "/Docs/Deep")], 80).await.unwrap();
        assert!(store.find_by_id("acc", "f2", Visibility::Visible).await.unwrap().is_some());

        assert_eq!(store.purge_deleted("acc").await.unwrap(), 2);
        assert!(store.find_by_id("acc", "f1", Visibility::All).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_hidden_resets_previous_flags() {
        let store = seeded_store().await;
        store.apply_hidden("acc", &HiddenSet::parse("f3")).await.unwrap();
        assert!(store.find_by_id("acc", "f3", Visibility::Visible).await.unwrap().is_none());
        assert!(store.find_by_id("acc", "f3", Visibility::Live).await.unwrap().is_some());

        store.apply_hidden("acc", &HiddenSet::parse("f1")).await.unwrap();
        assert!(store.find_by_id("acc", "f3", Visibility::Visible).await.unwrap().is_some());
        assert!(store.find_by_id("acc", "f1", Visibility::Visible).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let store = NodeStore::new(memory_pool().await);
        let nodes = vec![
            Node::root("r"),
            child("a", "100%_done.txt", false, "r", "/"),
            child("b", "100abc.txt", false, "r", "/"),
            child("c", "Report.PDF", false, "r", "/"),
        ];
        store.upsert("acc", &nodes, 80).await.unwrap();

        let hits = store.search_by_name("acc", "%_", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_id, "a");

        let ci = store.search_by_name("acc", "report", 10).await.unwrap();
        assert_eq!(ci.len(), 1);

        assert_eq!(store.search_by_name("acc", "100", 1).await.unwrap().len(), 1);
        // The root has an empty name and is never a hit
        assert_eq!(store.search_by_name("acc", "", 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_clear_account_is_scoped() {
        let store = seeded_store().await;
        store.upsert("other", &[Node::root("r"), child("o1", "o.txt", false, "r", "/")], 80).await.unwrap();

        let mut conn = store.pool().acquire().await.unwrap();
        let removed = cache::clear_account(&mut conn, "acc").await.unwrap();
        drop(conn);
        assert_eq!(removed, 6);
        assert!(store.all_nodes("acc", Visibility::All).await.unwrap().is_empty());
        assert_eq!(store.count_live("other").await.unwrap(), 1);
    }
}
