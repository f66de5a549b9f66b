#[cfg(test)]
mod error_tests {
    use crabdock::errors::EmbedError;
    use std::error::Error;

    #[test]
    fn test_embed_error_config() {
        let error = EmbedError::Config("retry.max_attempts must be positive".to_string());
        assert!(error.to_string().contains("Configuration error"));
        assert!(error.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_embed_error_store_unavailable() {
        let error = EmbedError::StoreUnavailable("settings not ready".to_string());
        assert_eq!(
            error.to_string(),
            "Mapping store unavailable: settings not ready"
        );
    }

    #[test]
    fn test_embed_error_dom() {
        let error = EmbedError::Dom("stale node".to_string());
        assert_eq!(format!("{}", error), "DOM operation failed: stale node");
    }

    #[test]
    fn test_embed_error_debug_format() {
        let error = EmbedError::Playback("autoplay blocked".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("Playback"));
        assert!(debug_str.contains("autoplay blocked"));
    }

    #[test]
    fn test_embed_error_implements_error_trait() {
        let error = EmbedError::MediaUnavailable("no canvas".to_string());
        let _error_trait: &dyn Error = &error;
        assert!(error.source().is_none());
    }

    #[test]
    fn test_all_error_kinds_are_distinct() {
        let errors = vec![
            EmbedError::Config("a".to_string()),
            EmbedError::StoreUnavailable("b".to_string()),
            EmbedError::Dom("c".to_string()),
            EmbedError::Playback("d".to_string()),
            EmbedError::MediaUnavailable("e".to_string()),
        ];

        let mut kinds: Vec<&str> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());

        for error in &errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_error_converts_into_anyhow() {
        fn load() -> anyhow::Result<()> {
            Err(EmbedError::Config("bad toml".to_string()))?;
            Ok(())
        }
        let err = load().unwrap_err();
        assert!(err.to_string().contains("bad toml"));
        assert!(err.downcast_ref::<EmbedError>().is_some());
    }
}
