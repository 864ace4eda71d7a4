pub mod models;
pub mod validation;

pub use models::*;
pub use validation::*;

#[cfg(test)]
mod tests {
    use super::*;
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };
    use garde::Validate;
    use std::io::Write;

    fn from_toml(toml: &str) -> AppConfig {
        Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .expect("Should parse")
    }

    #[test]
    fn test_valid_config_loads() {
        let config = from_toml(
            r#"
            [server]
            port = 8080
            bind = "0.0.0.0"

            [tracing]
            exporter = "otlp_grpc"
            sample_rate = 0.25

            [metrics]
            path = "/internal/metrics"
            prefix = "shop_"
            process_metrics = false

            [access_log]
            max_body_bytes = 2048
            skip_paths = ["/ping", "/health"]
        "#,
        );

        assert!(config.validate().is_ok());
        assert_eq!(config.tracing.exporter, "otlp_grpc");
        assert_eq!(config.tracing.sample_rate, 0.25);
        assert_eq!(config.metrics.prefix, "shop_");
        assert!(!config.metrics.process_metrics);
        assert_eq!(config.access_log.max_body_bytes, 2048);
        assert_eq!(config.access_log.skip_paths.len(), 2);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_default_values_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracing.exporter, "NOOP");
        assert_eq!(config.metrics.path, "/metrics");
        assert_eq!(config.access_log.max_body_bytes, 1_000_000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            ("[server]\nport = 80", "port"),
            ("[server]\nbind = \"invalid-ip-address\"", "bind"),
            ("[logging]\nformat = \"xml\"", "format"),
            ("[tracing]\nexporter = \"zipkin\"", "exporter"),
            ("[tracing]\nsample_rate = 1.5", "sample_rate"),
            ("[metrics]\npath = \"metrics\"", "path"),
            ("[access_log]\nmax_body_bytes = 0", "max_body_bytes"),
        ];

        for (toml, field) in cases {
            let err = from_toml(toml).validate().unwrap_err();
            assert!(err.to_string().contains(field), "{field} not reported: {err}");
        }
    }

    #[test]
    fn test_environment_names() {
        let config = from_toml(r#"environment = "staging""#);
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.environment.as_str(), "staging");
    }

    #[test]
    fn test_config_hierarchy() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 9090\n\n[tracing]\nexporter = \"stdout\"\nservice_name = \"from-file\""
        )
        .unwrap();

        unsafe {
            std::env::set_var("APP_TRACING__SERVICE_NAME", "from-env");
        }

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            exporter: Some("noop".to_string()),
            ..Default::default()
        };
        let config = load_config(&cli).expect("Should merge configs");

        unsafe {
            std::env::remove_var("APP_TRACING__SERVICE_NAME");
        }

        // File overrides defaults
        assert_eq!(config.server.port, 9090);
        // Environment overrides the file
        assert_eq!(config.tracing.service_name, "from-env");
        // Flags override everything
        assert_eq!(config.tracing.exporter, "noop");
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli {
            port: Some(4000),
            log_format: Some("pretty".to_string()),
            ..Default::default()
        };
        let config = load_config(&cli).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.server.bind, "0.0.0.0");
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli {
            config: Some("/definitely/not/here.toml".into()),
            ..Default::default()
        };
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_invalid_cli_value_fails_validation() {
        let cli = Cli {
            port: Some(80),
            ..Default::default()
        };
        assert!(load_config(&cli).is_err());
    }
}
