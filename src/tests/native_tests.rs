#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::cache::Visibility;
    use crate::download::DownloadTarget;
    use crate::source::{Backend, DriveKind, DriveRegistry, NativeDrive, SourceError};
    use crate::state::AppState;
    use crate::tests::support::{account_config, memory_pool, test_config};

    fn build_tree(root: &Path) {
        fs::create_dir_all(root.join("docs/deep")).unwrap();
        fs::write(root.join("docs/README.md"), "# Docs\nhello").unwrap();
        fs::write(root.join("docs/deep/report.pdf"), vec![0u8; 300]).unwrap();
        fs::write(root.join("photo.jpg"), b"jpg").unwrap();
        fs::write(root.join("scratch.tmp"), b"tmp").unwrap();
        fs::write(root.join(".secret"), b"dot").unwrap();
    }

    async fn native_state(root: &Path, excludes: Vec<String>) -> AppState {
        let root_id = root.to_string_lossy().into_owned();
        let mut cfg = test_config(vec![account_config("disk", DriveKind::Native, &root_id)]);
        cfg.native.excludes = excludes.clone();
        let drives = DriveRegistry::new(NativeDrive::new(&excludes).unwrap());
        let state = AppState::new(memory_pool().await, cfg, drives);
        crate::jobs::bootstrap(&state).await.unwrap();
        state
    }

    async fn sync(state: &AppState) {
        let entry = state.accounts.require("disk").unwrap();
        state.orchestrator.full_sync(&entry.account, entry.backend().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_lists_children_skipping_dotfiles_and_excludes() {
        let dir = TempDir::new().unwrap();
        build_tree(dir.path());
        let root = dir.path().to_string_lossy().into_owned();
        let drive = NativeDrive::new(&["**/*.tmp".to_string()]).unwrap();

        let mut names: Vec<String> = drive.list_children(&root, &root).await.unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["docs", "photo.jpg"]);

        let missing = dir.path().join("gone").to_string_lossy().into_owned();
        assert!(matches!(drive.list_children(&root, &missing).await, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_ids_outside_root() {
        let dir = TempDir::new().unwrap();
        build_tree(dir.path());
        let root = dir.path().join("docs").to_string_lossy().into_owned();
        let drive = NativeDrive::default();

        let escape = format!("{}/../photo.jpg", root);
        assert!(drive.local_path(&root, &escape).is_err());
        let sibling = dir.path().join("photo.jpg").to_string_lossy().into_owned();
        assert!(drive.local_path(&root, &sibling).is_err());
        assert!(drive.list_children(&root, "/etc").await.is_err());

        let inside = dir.path().join("docs/README.md").to_string_lossy().into_owned();
        assert!(drive.local_path(&root, &inside).is_ok());
    }

    #[tokio::test]
    async fn test_full_sync_of_local_tree() {
        let dir = TempDir::new().unwrap();
        build_tree(dir.path());
        let state = native_state(dir.path(), vec!["**/*.tmp".to_string()]).await;
        sync(&state).await;

        let paths: Vec<String> = state
            .store
            .all_nodes("disk", Visibility::All)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.path)
            .collect();
        assert_eq!(paths, vec!["/", "/docs", "/docs/README.md", "/docs/deep", "/docs/deep/report.pdf", "/photo.jpg"]);

        let report = state.store.find_by_path("disk", "/docs/deep/report.pdf", Visibility::Visible).await.unwrap().unwrap();
        assert_eq!(report.size, 300);
        assert!(report.modified_at.is_some());
    }

    #[tokio::test]
    async fn test_incremental_sync_sees_local_changes() {
        let dir = TempDir::new().unwrap();
        build_tree(dir.path());
        let state = native_state(dir.path(), vec![]).await;
        sync(&state).await;

        fs::remove_dir_all(dir.path().join("docs/deep")).unwrap();
        fs::write(dir.path().join("docs/new.txt"), b"new").unwrap();

        let entry = state.accounts.require("disk").unwrap();
        let report = state.orchestrator.incremental_sync(&entry.account, entry.backend().unwrap(), "/docs").await.unwrap();
        assert_eq!(report.tombstoned, 2);
        assert!(state.store.find_by_path("disk", "/docs/new.txt", Visibility::Visible).await.unwrap().is_some());
        assert!(state.store.find_by_path("disk", "/docs/deep", Visibility::Visible).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_includes_readme_preview() {
        let dir = TempDir::new().unwrap();
        build_tree(dir.path());
        let state = native_state(dir.path(), vec![]).await;
        sync(&state).await;

        let entry = state.accounts.require("disk").unwrap();
        let listing = state.query.list_by_path(entry, "/docs", None).await.unwrap();
        assert_eq!(listing.readme.as_deref(), Some("# Docs\nhello"));
        assert_eq!(state.query.readme_cache().len(), 1);

        let root = state.query.list_by_path(entry, "/", None).await.unwrap();
        assert!(root.readme.is_none());
    }

    #[tokio::test]
    async fn test_download_resolves_local_path() {
        let dir = TempDir::new().unwrap();
        build_tree(dir.path());
        let state = native_state(dir.path(), vec![]).await;
        sync(&state).await;

        let entry = state.accounts.require("disk").unwrap();
        assert!(matches!(entry.backend().unwrap(), Backend::Native(_)));
        let id = dir.path().join("photo.jpg").to_string_lossy().into_owned();
        let target = state.downloads.resolve(entry, &id, None).await.unwrap();
        assert_eq!(target, DownloadTarget::Local(dir.path().join("photo.jpg")));
    }
}
