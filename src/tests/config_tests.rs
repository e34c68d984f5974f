#[cfg(test)]
mod tests {
    use crate::config::{self, AppConfig, MAX_BATCH_SIZE};
    use crate::source::DriveKind;
    use crate::tests::support::{account_config, test_config};
    use std::env;
    use std::fs;
    use tempfile::NamedTempFile;

    fn with_overrides(extra: &str) -> AppConfig {
        let defaults: &str = include_str!("../../config/default.toml");
        ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .add_source(::config::File::from_str(extra, ::config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.url, "sqlite://data/cloudindex.db");
        assert_eq!(config.sync.full_sync_interval_secs, 21600);
        assert_eq!(config.sync.cookie_refresh_interval_secs, 3600);
        assert!(config.sync.sync_on_startup);
        assert_eq!(config.sync.batch_size, 80);
        assert_eq!(config.index.search_limit, 500);
        assert_eq!(config.index.readme_timeout_secs, 10);
        assert!(config.index.api_token.is_empty());
        assert!(config.allowed_referrers().is_empty());
        assert!(config.accounts.is_empty());
        assert!(config.native.excludes.is_empty());
        assert!(config::validate(&config).is_ok());
    }

    #[test]
    fn test_accounts_from_toml() {
        let config = with_overrides(
            r#"
            [[accounts]]
            id = "tb"
            name = "Team"
            mode = "teambition-us"
            root_id = "abc"
            user = "me@example.com"
            password = "pw"

            [[accounts]]
            id = "disk"
            mode = "native"
            root_id = "/srv/share"
            default = true
            "#,
        );
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts[0].mode, DriveKind::TeambitionUs);
        assert_eq!(config.accounts[1].mode, DriveKind::Native);
        assert!(config.accounts[1].default);
        assert!(config.accounts[1].name.is_empty());
        assert!(config::validate(&config).is_ok());
    }

    #[test]
    fn test_referrers_and_readme_timeout() {
        let mut config = with_overrides(
            r#"
            [index]
            only_referrer = " Blog.Example ,, cdn.example:8443 "
            "#,
        );
        assert_eq!(config.allowed_referrers(), vec!["blog.example", "cdn.example:8443"]);

        config.index.readme_timeout_secs = 0;
        let err = config::validate(&config).unwrap_err();
        assert!(err.to_string().contains("readme_timeout_secs"));
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let defaults: &str = include_str!("../../config/default.toml");
        let result = ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .add_source(::config::File::from_str(
                "[[accounts]]\nid = \"x\"\nmode = \"ftp\"\nroot_id = \"/\"\n",
                ::config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize::<AppConfig>();
        assert!(result.is_err());
    }

    #[test]
    fn test_hidden_and_password_lists() {
        let mut config = AppConfig::default();
        config.index.hide_file_ids = "a, b".into();
        config.index.pwd_dir_ids = "dir1:pw1,dir2:pw:2".into();
        assert!(config::validate(&config).is_ok());
        assert!(config.hidden_set().contains("b"));
        let gate = config.password_gate();
        assert!(gate.is_protected("dir2"));
        assert!(!gate.is_locked("dir2", Some("pw:2")));

        config.index.pwd_dir_ids = "dir1".into();
        let err = config::validate(&config).unwrap_err();
        assert!(err.to_string().contains("invalid index.pwd_dir_ids"));
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = AppConfig::default();
        config.sync.batch_size = 0;
        assert!(config::validate(&config).is_err());
        config.sync.batch_size = MAX_BATCH_SIZE;
        assert!(config::validate(&config).is_ok());
        config.sync.batch_size = MAX_BATCH_SIZE + 1;
        assert!(config::validate(&config).unwrap_err().to_string().contains("sync.batch_size"));
    }

    #[test]
    fn test_account_rules() {
        let dup = test_config(vec![
            account_config("a", DriveKind::Native, "/x"),
            account_config("a", DriveKind::Cloud189, "-11"),
        ]);
        assert!(config::validate(&dup).unwrap_err().to_string().contains("duplicate account id"));

        let empty_root = test_config(vec![account_config("a", DriveKind::Native, " ")]);
        assert!(config::validate(&empty_root).is_err());

        let mut first = account_config("a", DriveKind::Native, "/x");
        first.default = true;
        let mut second = account_config("b", DriveKind::Native, "/y");
        second.default = true;
        let two_defaults = test_config(vec![first, second]);
        assert!(config::validate(&two_defaults).unwrap_err().to_string().contains("at most one"));
    }

    #[test]
    fn test_bad_exclude_glob() {
        let mut config = AppConfig::default();
        config.native.excludes = vec!["[unclosed".into()];
        assert!(config::validate(&config).unwrap_err().to_string().contains("native.excludes"));
    }

    #[test]
    fn test_ensure_sqlite_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested/data/index.db");
        let url = format!("sqlite://{}", db_path.display());
        config::ensure_sqlite_parent_dir(&url).unwrap();
        assert!(db_path.parent().unwrap().is_dir());
        assert!(config::ensure_sqlite_parent_dir("sqlite::memory:").is_ok());
    }

    // Everything touching process-wide env vars stays in this one test so it cannot
    // race with other tests.
    #[test]
    fn test_load_layers() {
        assert!(config::load().is_ok());

        env::set_var("CLOUDINDEX__SERVER__PORT", "0");
        let result = config::load();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("invalid server.port"));
        env::remove_var("CLOUDINDEX__SERVER__PORT");

        let file = NamedTempFile::with_suffix(".toml").unwrap();
        fs::write(file.path(), "[server]\nhost = \"0.0.0.0\"\nport = 9000\n\n[index]\nsearch_limit = 25\n").unwrap();
        env::set_var("CLOUDINDEX_CONFIG", file.path());
        env::set_var("CLOUDINDEX__SERVER__PORT", "3000");
        let config = config::load().unwrap();
        env::remove_var("CLOUDINDEX_CONFIG");
        env::remove_var("CLOUDINDEX__SERVER__PORT");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.index.search_limit, 25);
        assert_eq!(config.sync.batch_size, 80);
    }
}
