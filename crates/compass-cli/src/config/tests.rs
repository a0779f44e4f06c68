#[cfg(test)]
mod tests {
    use super::super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert!(!config.server.dev_header_auth);
        assert_eq!(config.llm.provider, Provider::Mistral);
        assert!(config.llm.use_environment_keys);
        assert_eq!(config.sparql.endpoint, "https://orkg.org/triplestore");
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.generation.max_iterations, 3);
        assert_eq!(config.statistics.retries, 3);
        assert_eq!(config.statistics.base_delay_ms, 5000);
        assert_eq!(config.rate_limit.policy(), RateLimitPolicy::default());
    }

    #[test]
    fn test_partial_sections_keep_field_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            dev_header_auth = true

            [llm]
            provider = "groq"

            [llm.groq]
            api_key = "gsk-test"

            [store]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, default_bind());
        assert!(config.server.dev_header_auth);
        assert_eq!(config.llm.provider, Provider::Groq);
        let groq = config.llm.provider_config(Provider::Groq).unwrap();
        assert_eq!(groq.api_key, "gsk-test");
        assert!(groq.model.is_none());
        assert!(config.llm.provider_config(Provider::OpenAi).is_none());
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.path, default_store_path());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        assert!(Config::from_toml("[llm]\nprovider = \"anthropic\"").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.generation.max_iterations, default_max_iterations());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compass.toml");
        std::fs::write(
            &path,
            "[auth]\njwt_secret = \"s3cret\"\nadmin_emails = [\"admin@example.org\"]\n\n[generation]\nmax_iterations = 5\n",
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.jwt_secret().as_deref(), Some("s3cret"));
        assert_eq!(config.auth.admin_emails, vec!["admin@example.org".to_string()]);
        assert_eq!(config.generation.max_iterations, 5);
    }

    #[test]
    fn test_rate_limit_section() {
        let config = Config::from_toml("[rate_limit]\nai_requests = 0\n").unwrap();
        assert_eq!(config.rate_limit.window_hours, 24);
        assert_eq!(config.rate_limit.policy().max_requests, 0);

        let config = Config::from_toml("[rate_limit]\nai_requests = 20\nwindow_hours = 1\n").unwrap();
        assert_eq!(config.rate_limit.policy(), RateLimitPolicy::new(20, 1));
    }
}
