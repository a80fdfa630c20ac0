use std::sync::Arc;

use switchboard_agent::{BuildError, ConversationService, RouterBuilder};
use switchboard_core::config::{AppConfig, ConfigError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub service: Arc<ConversationService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("router wiring failed: {0}")]
    Router(#[from] BuildError),
}

/// Loads config and wires the router in one step. `main` loads config itself so logging is
/// up before wiring starts.
#[cfg(test)]
pub fn bootstrap(
    options: switchboard_core::config::LoadOptions,
) -> Result<Application, BootstrapError> {
    bootstrap_with_config(AppConfig::load(options)?)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        classifier = ?config.router.classifier,
        input_gate = ?config.router.input_gate,
        output_gate = ?config.router.output_gate,
        "starting application bootstrap"
    );

    let service = RouterBuilder::new(config.clone()).build()?;
    info!(
        event_name = "system.bootstrap.router_ready",
        correlation_id = "bootstrap",
        uses_provider = config.router.uses_provider(),
        history_limit = config.router.history_limit,
        "router pipeline wired"
    );

    Ok(Application { config, service: Arc::new(service) })
}

#[cfg(test)]
mod tests {
    use switchboard_core::config::{ConfigOverrides, LoadOptions, StageStrategy};
    use switchboard_core::domain::caller::CallerContext;

    use crate::bootstrap::{bootstrap, BootstrapError};

    #[test]
    fn bootstrap_fails_fast_when_provider_stage_has_no_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                input_gate: Some(StageStrategy::Provider),
                llm_api_key: Some("   ".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let error = result.err().expect("missing credentials should fail");
        assert!(matches!(error, BootstrapError::Config(_)));
        assert!(error.to_string().contains("llm.api_key"));
    }

    #[tokio::test]
    async fn bootstrapped_service_answers_product_questions() {
        let app = bootstrap(LoadOptions::default()).expect("offline defaults bootstrap");
        let outcome = app
            .service
            .handle(CallerContext::new("boot-1", "Areeba"), "how much is an eraser?", None)
            .await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.response.map(|response| response.handler.to_string()), Some("product".into()));
    }
}
