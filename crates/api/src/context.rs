/// Shared application state, built once at startup and handed to every
/// route as `Arc<ApiContext>`. Grounded on `crates/mailflow-api/src/context.rs`'s
/// `ApiContext`, with the Lambda/DynamoDB/CloudWatch clients swapped for the
/// `Store` + domain-service stack `postbox-core` exposes.
use crate::auth::JwtValidator;
use crate::config::Config;
use crate::error::ApiError;
use postbox_core::email::composer::{EmailComposer, LettreEmailComposer};
use postbox_core::email::parser::{EmailParser, MailParserEmailParser};
use postbox_core::routing::RoutingEngine;
use postbox_core::services::quota::QuotaGate;
use postbox_core::services::receipt_rules::ReceiptRuleManager;
use postbox_core::services::store::{PgStore, Store};
use postbox_core::services::thread::ThreadBuilder;
use postbox_core::services::{ForwardExecutor, HttpQuotaGate, HttpWebhookExecutor, Ingestor, MailerForwardExecutor, Sender, SesMailer, SesReceiptRuleManager, WebhookExecutor};
use std::sync::Arc;

pub struct ApiContext {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub mailer: Arc<SesMailer>,
    pub receipt_rules: Arc<dyn ReceiptRuleManager>,
    pub routing: Arc<RoutingEngine>,
    pub ingestor: Arc<Ingestor>,
    pub sender: Arc<Sender>,
    pub thread_builder: Arc<ThreadBuilder>,
    pub jwt_validator: Arc<JwtValidator>,
    webhook_executor: Arc<dyn WebhookExecutor>,
    forward_executor: Arc<dyn ForwardExecutor>,
}

impl ApiContext {
    /// Exposed separately from `routing` for the `/endpoints/{id}/test`
    /// route, which dispatches directly against one endpoint rather than
    /// through recipient resolution.
    pub fn webhook_executor(&self) -> &Arc<dyn WebhookExecutor> {
        &self.webhook_executor
    }

    pub fn forward_executor(&self) -> &Arc<dyn ForwardExecutor> {
        &self.forward_executor
    }
}

impl ApiContext {
    pub async fn new(config: Config) -> Result<Arc<Self>, ApiError> {
        let store: Arc<dyn Store> = Arc::new(
            PgStore::connect(&config.database_url, config.database_max_connections)
                .await
                .map_err(ApiError::from)?,
        );

        let aws_config = aws_config::load_from_env().await;
        let ses_client = aws_sdk_ses::Client::new(&aws_config);
        let s3_client = aws_sdk_s3::Client::new(&aws_config);

        let mailer = Arc::new(SesMailer::new(ses_client.clone(), s3_client));
        let receipt_rules: Arc<dyn ReceiptRuleManager> = Arc::new(SesReceiptRuleManager::new(
            ses_client,
            config.ses_receipt_rule_set_name.clone(),
            config.raw_emails_bucket.clone(),
            "inbound".to_string(),
        ));

        let http_client = reqwest::Client::new();
        let quota: Arc<dyn QuotaGate> = Arc::new(HttpQuotaGate::new(
            http_client,
            config.entitlement_base_url.clone(),
            config.entitlement_api_key.clone(),
        ));

        let webhook: Arc<dyn WebhookExecutor> = Arc::new(HttpWebhookExecutor::new());
        let composer: Arc<dyn EmailComposer> = Arc::new(LettreEmailComposer::new());
        let forward: Arc<dyn ForwardExecutor> = Arc::new(MailerForwardExecutor::new(
            mailer.clone(),
            composer.clone(),
            config.forwarder_sender_address.clone(),
        ));

        let routing = Arc::new(RoutingEngine::new(store.clone(), webhook.clone(), forward.clone()));

        let parser: Arc<dyn EmailParser> = Arc::new(MailParserEmailParser);

        let ingestor = Arc::new(Ingestor::new(store.clone(), quota.clone(), parser, mailer.clone(), routing.clone()));

        let sender = Arc::new(Sender::new(
            store.clone(),
            mailer.clone(),
            composer,
            quota,
            config.agent_sender_address.clone(),
        ));

        let thread_builder = Arc::new(ThreadBuilder::new(store.clone()));

        let jwt_validator = Arc::new(JwtValidator::new(&config.jwks_json).map_err(ApiError::Internal)?);

        Ok(Arc::new(Self {
            config,
            store,
            mailer,
            receipt_rules,
            routing,
            ingestor,
            sender,
            thread_builder,
            jwt_validator,
            webhook_executor: webhook,
            forward_executor: forward,
        }))
    }
}
