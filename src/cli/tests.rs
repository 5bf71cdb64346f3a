#[cfg(test)]
mod tests {
    use crate::cli::Args;
    use crate::config::LLMProvider;
    use clap::Parser;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_args_require_title() {
        assert!(Args::try_parse_from(["labelscout"]).is_err());
    }

    #[test]
    fn test_args_default_values() {
        let args = Args::try_parse_from(["labelscout", "Labeler code 00002"]).unwrap();

        assert_eq!(args.title, "Labeler code 00002");
        assert!(args.config.is_none());
        assert!(args.thread_id.is_none());
        assert!(args.output_path.is_none());
        assert!(!args.agentic_review);
        assert!(!args.no_cache);
        assert!(!args.skip_connection_check);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_short_options() {
        let args = Args::try_parse_from([
            "labelscout",
            "Labeler code 00002",
            "-o",
            "/tmp/report",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.output_path, Some(PathBuf::from("/tmp/report")));
        assert!(args.verbose);
    }

    #[test]
    fn test_into_config_overrides() {
        let config_file = NamedTempFile::new().unwrap();
        let args = Args::try_parse_from([
            "labelscout",
            "Labeler code 00002",
            "--config",
            config_file.path().to_str().unwrap(),
            "--thread-id",
            "session-7",
            "--download-dir",
            "/tmp/files",
            "--max-iterations",
            "12",
            "--max-execution-secs",
            "90",
            "--max-records",
            "5",
            "--llm-provider",
            "openai",
            "--model-efficient",
            "gpt-4o-mini",
            "--temperature",
            "0.3",
            "--agentic-review",
            "--skip-connection-check",
        ])
        .unwrap();

        let config = args.into_config().unwrap();
        assert_eq!(config.thread_id, "session-7");
        assert_eq!(config.download.directory, PathBuf::from("/tmp/files"));
        assert_eq!(config.research.max_iterations, 12);
        assert_eq!(config.research.max_execution_secs, 90);
        assert_eq!(config.research.max_records, Some(5));
        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
        assert_eq!(config.llm.model_efficient, "gpt-4o-mini");
        assert_eq!(config.llm.temperature, 0.3);
        assert!(config.executor.agentic_review);
        assert!(config.skip_connection_check);
    }

    #[test]
    fn test_config_file_values_survive_without_flags() {
        let mut config_file = NamedTempFile::new().unwrap();
        writeln!(
            config_file,
            "thread_id = \"from-file\"\nrecursion_limit = 7\n\n[research]\nmax_iterations = 4"
        )
        .unwrap();

        let args = Args::try_parse_from([
            "labelscout",
            "t",
            "--config",
            config_file.path().to_str().unwrap(),
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.thread_id, "from-file");
        assert_eq!(config.recursion_limit, 7);
        assert_eq!(config.research.max_iterations, 4);
        assert_eq!(config.research.max_execution_secs, 600);
    }

    #[test]
    fn test_invalid_provider_is_an_error() {
        let config_file = NamedTempFile::new().unwrap();
        let args = Args::try_parse_from([
            "labelscout",
            "t",
            "--config",
            config_file.path().to_str().unwrap(),
            "--llm-provider",
            "unknown",
        ])
        .unwrap();
        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = Args::try_parse_from([
            "labelscout",
            "t",
            "--config",
            "/nonexistent/labelscout.toml",
        ])
        .unwrap();
        assert!(args.into_config().is_err());
    }
}
