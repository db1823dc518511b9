use quire_config::{with_config_env_lock, QuireConfig, QUIRE_CONFIG_ENV_VAR};

#[test]
fn load_from_env_follows_the_config_path_variable() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("quire.toml");
    std::fs::write(&path, "[workspace]\nupdate_delay_ms = 42\n").unwrap();

    with_config_env_lock(|| {
        std::env::set_var(QUIRE_CONFIG_ENV_VAR, &path);
        let loaded = QuireConfig::load_from_env();
        std::env::remove_var(QUIRE_CONFIG_ENV_VAR);

        assert_eq!(loaded.unwrap().workspace.update_delay_ms, 42);
        assert_eq!(QuireConfig::load_from_env().unwrap(), QuireConfig::default());
    });
}
