#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::download::DownloadTarget;
    use crate::error::AppError;
    use crate::source::SourceError;
    use crate::state::AppState;
    use crate::tests::support::{cloud_state, FakeDrive};

    async fn synced_state(tweak: impl FnOnce(&mut crate::config::AppConfig)) -> (AppState, Arc<FakeDrive>) {
        let drive = FakeDrive::with_sample_tree();
        let state = cloud_state(drive.clone(), tweak).await;
        let entry = state.accounts.require("main").unwrap().clone();
        state.orchestrator.full_sync(&entry.account, entry.backend().unwrap()).await.unwrap();
        (state, drive)
    }

    #[tokio::test]
    async fn test_remote_file_resolves_to_url() {
        let (state, _) = synced_state(|_| {}).await;
        let entry = state.accounts.require("main").unwrap();
        let target = state.downloads.resolve(entry, "f-a", None).await.unwrap();
        assert_eq!(target, DownloadTarget::Url("https://dl.example.test/f-a".into()));
    }

    #[tokio::test]
    async fn test_folders_and_unknown_ids_are_rejected() {
        let (state, _) = synced_state(|_| {}).await;
        let entry = state.accounts.require("main").unwrap();
        let err = state.downloads.resolve(entry, "movies", None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err = state.downloads.resolve(entry, "ghost", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_hidden_and_deleted_files_are_not_found() {
        let (state, _) = synced_state(|cfg| cfg.index.hide_file_ids = "f-notes".into()).await;
        let entry = state.accounts.require("main").unwrap();
        let err = state.downloads.resolve(entry, "f-notes", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        state.store.mark_deleted_subtree("main", "sub", true).await.unwrap();
        let err = state.downloads.resolve(entry, "f-b", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_locked_parent_requires_password() {
        let (state, _) = synced_state(|cfg| cfg.index.pwd_dir_ids = "movies:pw".into()).await;
        let entry = state.accounts.require("main").unwrap();
        let err = state.downloads.resolve(entry, "f-a", None).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(state.downloads.resolve(entry, "f-a", Some("pw")).await.is_ok());
    }

    #[tokio::test]
    async fn test_backend_errors_are_mapped() {
        let (state, drive) = synced_state(|_| {}).await;
        let entry = state.accounts.require("main").unwrap();

        drive.fail_downloads(SourceError::SessionExpired("cookie".into()));
        let err = state.downloads.resolve(entry, "f-a", None).await.unwrap_err();
        assert!(matches!(err, AppError::SessionExpired(_)));

        drive.fail_downloads(SourceError::Unavailable("down".into()));
        let err = state.downloads.resolve(entry, "f-a", None).await.unwrap_err();
        assert!(matches!(err, AppError::RemoteUnavailable(_)));
    }
}
