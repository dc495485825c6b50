/// Keeps the cloud mailer's per-domain acceptance rules in sync with
/// `Domain`/`EmailAddress` state, SPEC_FULL §4.8. Grounded on
/// `services::ses.rs`'s trait+impl+retry shape, extended from raw send to
/// native SES receipt-rule CRUD against the account's single active rule
/// set (`SES_RECEIPT_RULE_SET_NAME`).
use crate::error::CoreError;
use crate::utils::retry::{RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use aws_sdk_ses::types::{ReceiptAction, ReceiptRule, S3Action};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleUpsertStatus {
    Created,
    Updated,
}

#[derive(Debug, Clone)]
pub struct RuleUpsertResult {
    pub status: RuleUpsertStatus,
    pub rule_name: String,
}

#[async_trait]
pub trait ReceiptRuleManager: Send + Sync {
    async fn enable_individual(&self, domain: &str, addresses: &[String]) -> Result<RuleUpsertResult, CoreError>;
    async fn enable_catch_all(&self, domain: &str) -> Result<RuleUpsertResult, CoreError>;
    async fn disable_catch_all(&self, domain: &str, remaining_addresses: &[String]) -> Result<(), CoreError>;
    async fn remove_all(&self, domain: &str) -> Result<(), CoreError>;
}

pub struct SesReceiptRuleManager {
    client: aws_sdk_ses::Client,
    rule_set_name: String,
    bucket: String,
    object_key_prefix: String,
}

impl SesReceiptRuleManager {
    pub fn new(client: aws_sdk_ses::Client, rule_set_name: String, bucket: String, object_key_prefix: String) -> Self {
        Self {
            client,
            rule_set_name,
            bucket,
            object_key_prefix,
        }
    }

    fn individual_rule_name(domain: &str) -> String {
        format!("{domain}-individual")
    }

    fn catch_all_rule_name(domain: &str) -> String {
        format!("{domain}-catchall")
    }

    fn s3_action(&self) -> Result<ReceiptAction, CoreError> {
        let s3 = S3Action::builder()
            .bucket_name(&self.bucket)
            .object_key_prefix(&self.object_key_prefix)
            .build();
        Ok(ReceiptAction::builder().s3(s3).build())
    }

    async fn rule_exists(&self, rule_name: &str) -> Result<bool, CoreError> {
        match self
            .client
            .describe_receipt_rule()
            .rule_set_name(&self.rule_set_name)
            .rule_name(rule_name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_rule_does_not_exist(&err) => Ok(false),
            Err(err) => Err(CoreError::UpstreamMailer(format!(
                "describe_receipt_rule failed for {rule_name}: {err}"
            ))),
        }
    }

    async fn upsert(&self, rule: ReceiptRule) -> Result<RuleUpsertResult, CoreError> {
        let rule_name = rule.name().unwrap_or_default().to_string();
        let exists = self.rule_exists(&rule_name).await?;

        if exists {
            retry_with_backoff(
                || {
                    let client = self.client.clone();
                    let rule_set_name = self.rule_set_name.clone();
                    let rule = rule.clone();
                    async move {
                        client
                            .update_receipt_rule()
                            .rule_set_name(rule_set_name)
                            .rule(rule)
                            .send()
                            .await
                            .map_err(|e| CoreError::UpstreamMailer(format!("update_receipt_rule failed: {e}")))
                    }
                },
                RetryConfig::default(),
                "ses_update_receipt_rule",
            )
            .await?;
            Ok(RuleUpsertResult {
                status: RuleUpsertStatus::Updated,
                rule_name,
            })
        } else {
            retry_with_backoff(
                || {
                    let client = self.client.clone();
                    let rule_set_name = self.rule_set_name.clone();
                    let rule = rule.clone();
                    async move {
                        client
                            .create_receipt_rule()
                            .rule_set_name(rule_set_name)
                            .rule(rule)
                            .send()
                            .await
                            .map_err(|e| CoreError::UpstreamMailer(format!("create_receipt_rule failed: {e}")))
                    }
                },
                RetryConfig::default(),
                "ses_create_receipt_rule",
            )
            .await?;
            Ok(RuleUpsertResult {
                status: RuleUpsertStatus::Created,
                rule_name,
            })
        }
    }

    async fn delete_if_present(&self, rule_name: &str) -> Result<(), CoreError> {
        match self
            .client
            .delete_receipt_rule()
            .rule_set_name(&self.rule_set_name)
            .rule_name(rule_name)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_rule_does_not_exist(&err) => Ok(()),
            Err(err) => Err(CoreError::UpstreamMailer(format!(
                "delete_receipt_rule failed for {rule_name}: {err}"
            ))),
        }
    }
}

fn is_rule_does_not_exist<E: std::fmt::Display>(err: &E) -> bool {
    err.to_string().contains("RuleDoesNotExist")
}

#[async_trait]
impl ReceiptRuleManager for SesReceiptRuleManager {
    async fn enable_individual(&self, domain: &str, addresses: &[String]) -> Result<RuleUpsertResult, CoreError> {
        let rule = ReceiptRule::builder()
            .name(Self::individual_rule_name(domain))
            .enabled(true)
            .set_recipients(Some(addresses.to_vec()))
            .actions(self.s3_action()?)
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build receipt rule: {e}")))?;

        let result = self.upsert(rule).await?;
        tracing::info!(domain, rule_name = %result.rule_name, "individual receipt rule upserted");
        Ok(result)
    }

    async fn enable_catch_all(&self, domain: &str) -> Result<RuleUpsertResult, CoreError> {
        let rule = ReceiptRule::builder()
            .name(Self::catch_all_rule_name(domain))
            .enabled(true)
            .recipients(domain)
            .actions(self.s3_action()?)
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build receipt rule: {e}")))?;

        let result = self.upsert(rule).await?;
        self.delete_if_present(&Self::individual_rule_name(domain)).await?;
        tracing::info!(domain, rule_name = %result.rule_name, "catch-all receipt rule upserted");
        Ok(result)
    }

    async fn disable_catch_all(&self, domain: &str, remaining_addresses: &[String]) -> Result<(), CoreError> {
        self.delete_if_present(&Self::catch_all_rule_name(domain)).await?;
        if !remaining_addresses.is_empty() {
            self.enable_individual(domain, remaining_addresses).await?;
        }
        Ok(())
    }

    async fn remove_all(&self, domain: &str) -> Result<(), CoreError> {
        self.delete_if_present(&Self::individual_rule_name(domain)).await?;
        self.delete_if_present(&Self::catch_all_rule_name(domain)).await?;
        Ok(())
    }
}
