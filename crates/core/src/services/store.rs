/// Relational store — the transactional KV+SQL interface every other
/// service is built on. No teacher precedent (the predecessor had no SQL
/// store); grounded on the sibling Axum+SQL backend in the retrieved pack,
/// adapted to `sqlx` with runtime-checked queries (no `query!` macro, since
/// this repo is never compiled against a live database).
use crate::error::CoreError;
use crate::models::*;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_domain_by_name(&self, name: &str) -> Result<Option<Domain>, CoreError>;
    async fn get_domain(&self, id: Uuid) -> Result<Option<Domain>, CoreError>;
    async fn list_domains(&self, owner: UserId) -> Result<Vec<Domain>, CoreError>;
    async fn create_domain(&self, domain: &Domain) -> Result<(), CoreError>;
    async fn set_domain_catch_all(
        &self,
        domain_id: Uuid,
        endpoint_id: Option<Uuid>,
        rule_name: Option<String>,
    ) -> Result<(), CoreError>;

    async fn get_endpoint(&self, id: Uuid) -> Result<Option<Endpoint>, CoreError>;
    async fn list_endpoints(&self, owner: UserId) -> Result<Vec<Endpoint>, CoreError>;
    async fn create_endpoint(&self, endpoint: &Endpoint) -> Result<(), CoreError>;
    async fn update_endpoint(&self, endpoint: &Endpoint) -> Result<(), CoreError>;
    /// Returns `DependencyBusy` if any `EmailAddress` or `Domain.catch_all_endpoint_id`
    /// still references this endpoint.
    async fn delete_endpoint(&self, id: Uuid) -> Result<(), CoreError>;
    async fn record_delivery_stats(&self, endpoint_id: Uuid, success: bool) -> Result<(), CoreError>;

    async fn find_active_email_address(
        &self,
        address: &str,
    ) -> Result<Option<EmailAddressRecord>, CoreError>;
    async fn get_email_address(&self, id: Uuid) -> Result<Option<EmailAddressRecord>, CoreError>;
    async fn list_email_addresses_for_domain(
        &self,
        domain_id: Uuid,
    ) -> Result<Vec<EmailAddressRecord>, CoreError>;
    async fn list_email_addresses_for_owner(&self, owner: UserId) -> Result<Vec<EmailAddressRecord>, CoreError>;
    async fn create_email_address(&self, record: &EmailAddressRecord) -> Result<(), CoreError>;
    async fn update_email_address(&self, record: &EmailAddressRecord) -> Result<(), CoreError>;
    async fn delete_email_address(&self, id: Uuid) -> Result<(), CoreError>;
    async fn set_receipt_rule_info(
        &self,
        email_address_id: Uuid,
        rule_name: Option<String>,
        configured: bool,
    ) -> Result<(), CoreError>;

    async fn insert_ingestion_event(&self, event: &IngestionEvent) -> Result<(), CoreError>;

    async fn insert_email_record(&self, record: &EmailRecord) -> Result<(), CoreError>;
    async fn insert_parsed_email(
        &self,
        email_record_id: Uuid,
        parsed: &ParsedEmail,
    ) -> Result<(), CoreError>;
    async fn get_email_record(&self, id: Uuid) -> Result<Option<EmailRecord>, CoreError>;
    async fn list_email_records(
        &self,
        owner: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EmailRecord>, CoreError>;
    async fn mark_email_read(&self, id: Uuid) -> Result<(), CoreError>;
    async fn find_email_records_by_message_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<EmailRecord>, CoreError>;
    async fn find_email_records_by_normalized_subject(
        &self,
        owner: UserId,
        normalized_subject: &str,
    ) -> Result<Vec<EmailRecord>, CoreError>;
    /// Outbound replies pointing at any of `email_ids` via `in_reply_to_email_id`,
    /// used to fold SentMessages into a thread built from EmailRecord nodes.
    async fn find_sent_messages_by_email_ids(
        &self,
        email_ids: &[Uuid],
    ) -> Result<Vec<SentMessage>, CoreError>;

    async fn insert_delivery_attempt(&self, attempt: &DeliveryAttempt) -> Result<(), CoreError>;

    async fn find_sent_message_by_idempotency_key(
        &self,
        owner: UserId,
        key: &str,
    ) -> Result<Option<SentMessage>, CoreError>;
    async fn insert_sent_message(&self, message: &SentMessage) -> Result<(), CoreError>;
    async fn finalize_sent_message_success(
        &self,
        id: Uuid,
        provider_message_id: &str,
    ) -> Result<(), CoreError>;
    async fn finalize_sent_message_failure(&self, id: Uuid, reason: &str) -> Result<(), CoreError>;

    async fn list_blocklist(&self, owner: Option<UserId>) -> Result<Vec<BlocklistEntry>, CoreError>;

    /// Looks up an active (non-revoked) API key by its hash, for principal resolution.
    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, CoreError>;
    async fn touch_api_key(&self, id: Uuid) -> Result<(), CoreError>;

    /// Used by the `/health` endpoint.
    async fn ping(&self) -> Result<(), CoreError>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::Config(format!("failed to connect to database: {e}")))?;
        Ok(Self::new(pool))
    }

    fn row_to_domain(row: &sqlx::postgres::PgRow) -> Result<Domain, CoreError> {
        Ok(Domain {
            id: DomainId(row.try_get("id")?),
            name: row.try_get("name")?,
            owner_user: UserId(row.try_get("owner_user")?),
            status: row.try_get("status")?,
            can_receive: row.try_get("can_receive")?,
            has_mx: row.try_get("has_mx")?,
            catch_all_endpoint_id: row.try_get("catch_all_endpoint_id")?,
            catch_all_rule_name: row.try_get("catch_all_rule_name")?,
            is_catch_all_enabled: row.try_get("is_catch_all_enabled")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_endpoint(row: &sqlx::postgres::PgRow) -> Result<Endpoint, CoreError> {
        let config_json: serde_json::Value = row.try_get("config")?;
        let config: EndpointConfig = serde_json::from_value(config_json)?;
        Ok(Endpoint {
            id: EndpointId(row.try_get("id")?),
            name: row.try_get("name")?,
            owner_user: UserId(row.try_get("owner_user")?),
            config,
            is_active: row.try_get("is_active")?,
            total_deliveries: row.try_get("total_deliveries")?,
            successful_deliveries: row.try_get("successful_deliveries")?,
            failed_deliveries: row.try_get("failed_deliveries")?,
            last_used: row.try_get("last_used")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_email_address(row: &sqlx::postgres::PgRow) -> Result<EmailAddressRecord, CoreError> {
        Ok(EmailAddressRecord {
            id: EmailAddressId(row.try_get("id")?),
            address: row.try_get("address")?,
            domain_id: DomainId(row.try_get("domain_id")?),
            endpoint_id: row
                .try_get::<Option<Uuid>, _>("endpoint_id")?
                .map(EndpointId),
            legacy_webhook_id: row
                .try_get::<Option<Uuid>, _>("legacy_webhook_id")?
                .map(EndpointId),
            is_active: row.try_get("is_active")?,
            is_receipt_rule_configured: row.try_get("is_receipt_rule_configured")?,
            receipt_rule_name: row.try_get("receipt_rule_name")?,
            owner_user: UserId(row.try_get("owner_user")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_email_record(row: &sqlx::postgres::PgRow) -> Result<EmailRecord, CoreError> {
        let to_json: serde_json::Value = row.try_get("to_addresses")?;
        let to: Vec<String> = serde_json::from_value(to_json)?;
        Ok(EmailRecord {
            id: EmailRecordId(row.try_get("id")?),
            ingestion_event_id: IngestionEventId(row.try_get("ingestion_event_id")?),
            message_id: row.try_get("message_id")?,
            from: row.try_get("from_address")?,
            to,
            recipient: row.try_get("recipient")?,
            subject: row.try_get("subject")?,
            status: row.try_get("status")?,
            is_read: row.try_get("is_read")?,
            read_at: row.try_get("read_at")?,
            owner_user: UserId(row.try_get("owner_user")?),
            received_at: row.try_get("received_at")?,
            processed_at: row.try_get("processed_at")?,
            parsed: None,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_domain_by_name(&self, name: &str) -> Result<Option<Domain>, CoreError> {
        let row = sqlx::query("SELECT * FROM domains WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_domain).transpose()
    }

    async fn get_domain(&self, id: Uuid) -> Result<Option<Domain>, CoreError> {
        let row = sqlx::query("SELECT * FROM domains WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_domain).transpose()
    }

    async fn list_domains(&self, owner: UserId) -> Result<Vec<Domain>, CoreError> {
        let rows = sqlx::query("SELECT * FROM domains WHERE owner_user = $1 ORDER BY created_at")
            .bind(owner.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_domain).collect()
    }

    async fn create_domain(&self, domain: &Domain) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO domains (id, name, owner_user, status, can_receive, has_mx, \
             catch_all_endpoint_id, catch_all_rule_name, is_catch_all_enabled, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(domain.id.0)
        .bind(&domain.name)
        .bind(domain.owner_user.0)
        .bind(domain.status)
        .bind(domain.can_receive)
        .bind(domain.has_mx)
        .bind(domain.catch_all_endpoint_id)
        .bind(&domain.catch_all_rule_name)
        .bind(domain.is_catch_all_enabled)
        .bind(domain.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_domain_catch_all(
        &self,
        domain_id: Uuid,
        endpoint_id: Option<Uuid>,
        rule_name: Option<String>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE domains SET catch_all_endpoint_id = $2, catch_all_rule_name = $3, \
             is_catch_all_enabled = $4 WHERE id = $1",
        )
        .bind(domain_id)
        .bind(endpoint_id)
        .bind(rule_name)
        .bind(endpoint_id.is_some())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_endpoint(&self, id: Uuid) -> Result<Option<Endpoint>, CoreError> {
        let row = sqlx::query("SELECT * FROM endpoints WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_endpoint).transpose()
    }

    async fn list_endpoints(&self, owner: UserId) -> Result<Vec<Endpoint>, CoreError> {
        let rows =
            sqlx::query("SELECT * FROM endpoints WHERE owner_user = $1 ORDER BY created_at")
                .bind(owner.0)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(Self::row_to_endpoint).collect()
    }

    async fn create_endpoint(&self, endpoint: &Endpoint) -> Result<(), CoreError> {
        let config_json = serde_json::to_value(&endpoint.config)?;
        sqlx::query(
            "INSERT INTO endpoints (id, name, owner_user, config, is_active, total_deliveries, \
             successful_deliveries, failed_deliveries, last_used, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(endpoint.id.0)
        .bind(&endpoint.name)
        .bind(endpoint.owner_user.0)
        .bind(config_json)
        .bind(endpoint.is_active)
        .bind(endpoint.total_deliveries)
        .bind(endpoint.successful_deliveries)
        .bind(endpoint.failed_deliveries)
        .bind(endpoint.last_used)
        .bind(endpoint.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_endpoint(&self, endpoint: &Endpoint) -> Result<(), CoreError> {
        let config_json = serde_json::to_value(&endpoint.config)?;
        sqlx::query(
            "UPDATE endpoints SET name = $2, config = $3, is_active = $4 WHERE id = $1",
        )
        .bind(endpoint.id.0)
        .bind(&endpoint.name)
        .bind(config_json)
        .bind(endpoint.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_endpoint(&self, id: Uuid) -> Result<(), CoreError> {
        let referencing_addresses: i64 = sqlx::query(
            "SELECT count(*) AS c FROM email_addresses WHERE endpoint_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?
        .try_get("c")?;

        let referencing_domains: i64 =
            sqlx::query("SELECT count(*) AS c FROM domains WHERE catch_all_endpoint_id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?
                .try_get("c")?;

        if referencing_addresses > 0 || referencing_domains > 0 {
            return Err(CoreError::DependencyBusy(format!(
                "endpoint {id} is still referenced by {referencing_addresses} address(es) and {referencing_domains} domain(s)"
            )));
        }

        sqlx::query("DELETE FROM endpoints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_delivery_stats(&self, endpoint_id: Uuid, success: bool) -> Result<(), CoreError> {
        let column = if success {
            "successful_deliveries"
        } else {
            "failed_deliveries"
        };
        let sql = format!(
            "UPDATE endpoints SET total_deliveries = total_deliveries + 1, \
             {column} = {column} + 1, last_used = now() WHERE id = $1"
        );
        sqlx::query(&sql).bind(endpoint_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn find_active_email_address(
        &self,
        address: &str,
    ) -> Result<Option<EmailAddressRecord>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM email_addresses WHERE address = $1 AND is_active = true",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_email_address).transpose()
    }

    async fn get_email_address(&self, id: Uuid) -> Result<Option<EmailAddressRecord>, CoreError> {
        let row = sqlx::query("SELECT * FROM email_addresses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_email_address).transpose()
    }

    async fn list_email_addresses_for_domain(
        &self,
        domain_id: Uuid,
    ) -> Result<Vec<EmailAddressRecord>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM email_addresses WHERE domain_id = $1 AND is_active = true",
        )
        .bind(domain_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_email_address).collect()
    }

    async fn list_email_addresses_for_owner(&self, owner: UserId) -> Result<Vec<EmailAddressRecord>, CoreError> {
        let rows = sqlx::query("SELECT * FROM email_addresses WHERE owner_user = $1 ORDER BY created_at DESC")
            .bind(owner.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_email_address).collect()
    }

    async fn update_email_address(&self, record: &EmailAddressRecord) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE email_addresses SET endpoint_id = $2, legacy_webhook_id = $3, is_active = $4 WHERE id = $1",
        )
        .bind(record.id.0)
        .bind(record.endpoint_id.map(|e| e.0))
        .bind(record.legacy_webhook_id.map(|e| e.0))
        .bind(record.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_email_address(&self, id: Uuid) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM email_addresses WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_email_address(&self, record: &EmailAddressRecord) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO email_addresses (id, address, domain_id, endpoint_id, legacy_webhook_id, is_active, \
             is_receipt_rule_configured, receipt_rule_name, owner_user, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(record.id.0)
        .bind(&record.address)
        .bind(record.domain_id.0)
        .bind(record.endpoint_id.map(|e| e.0))
        .bind(record.legacy_webhook_id.map(|e| e.0))
        .bind(record.is_active)
        .bind(record.is_receipt_rule_configured)
        .bind(&record.receipt_rule_name)
        .bind(record.owner_user.0)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_receipt_rule_info(
        &self,
        email_address_id: Uuid,
        rule_name: Option<String>,
        configured: bool,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE email_addresses SET receipt_rule_name = $2, is_receipt_rule_configured = $3 \
             WHERE id = $1",
        )
        .bind(email_address_id)
        .bind(rule_name)
        .bind(configured)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_ingestion_event(&self, event: &IngestionEvent) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO ingestion_events (id, message_id, source, destination, recipients, \
             spf_verdict, dkim_verdict, dmarc_verdict, spam_verdict, virus_verdict, bucket, \
             object_key, raw_content, received_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
        )
        .bind(event.id.0)
        .bind(&event.message_id)
        .bind(&event.source)
        .bind(serde_json::to_value(&event.destination)?)
        .bind(serde_json::to_value(&event.recipients)?)
        .bind(&event.spf_verdict)
        .bind(&event.dkim_verdict)
        .bind(&event.dmarc_verdict)
        .bind(&event.spam_verdict)
        .bind(&event.virus_verdict)
        .bind(&event.bucket)
        .bind(&event.object_key)
        .bind(&event.raw_content)
        .bind(event.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_email_record(&self, record: &EmailRecord) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO email_records (id, ingestion_event_id, message_id, from_address, \
             to_addresses, recipient, subject, status, is_read, read_at, owner_user, \
             received_at, processed_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(record.id.0)
        .bind(record.ingestion_event_id.0)
        .bind(&record.message_id)
        .bind(&record.from)
        .bind(serde_json::to_value(&record.to)?)
        .bind(&record.recipient)
        .bind(&record.subject)
        .bind(record.status)
        .bind(record.is_read)
        .bind(record.read_at)
        .bind(record.owner_user.0)
        .bind(record.received_at)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_parsed_email(
        &self,
        email_record_id: Uuid,
        parsed: &ParsedEmail,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO parsed_emails (email_record_id, data, parse_success, parse_error, \
             in_reply_to, references_list) VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(email_record_id)
        .bind(serde_json::to_value(parsed)?)
        .bind(parsed.parse_success)
        .bind(&parsed.parse_error)
        .bind(&parsed.in_reply_to)
        .bind(serde_json::to_value(&parsed.references)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_email_record(&self, id: Uuid) -> Result<Option<EmailRecord>, CoreError> {
        let row = sqlx::query("SELECT * FROM email_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let mut record = Self::row_to_email_record(&row)?;

        if let Some(parsed_row) =
            sqlx::query("SELECT data FROM parsed_emails WHERE email_record_id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
        {
            let data: serde_json::Value = parsed_row.try_get("data")?;
            record.parsed = Some(serde_json::from_value(data)?);
        }

        Ok(Some(record))
    }

    async fn list_email_records(
        &self,
        owner: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EmailRecord>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM email_records WHERE owner_user = $1 ORDER BY received_at DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(owner.0)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_email_record).collect()
    }

    async fn mark_email_read(&self, id: Uuid) -> Result<(), CoreError> {
        sqlx::query("UPDATE email_records SET is_read = true, read_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_email_records_by_message_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<EmailRecord>, CoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT er.* FROM email_records er \
             LEFT JOIN parsed_emails pe ON pe.email_record_id = er.id \
             WHERE er.message_id = ANY($1) \
                OR pe.in_reply_to = ANY($1) \
                OR pe.references_list ?| $1",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_email_record).collect()
    }

    async fn find_email_records_by_normalized_subject(
        &self,
        owner: UserId,
        normalized_subject: &str,
    ) -> Result<Vec<EmailRecord>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM email_records WHERE owner_user = $1 \
             AND lower(subject) = $2 ORDER BY received_at ASC",
        )
        .bind(owner.0)
        .bind(normalized_subject)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_email_record).collect()
    }

    async fn find_sent_messages_by_email_ids(
        &self,
        email_ids: &[Uuid],
    ) -> Result<Vec<SentMessage>, CoreError> {
        if email_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT * FROM sent_messages WHERE in_reply_to_email_id = ANY($1)")
            .bind(email_ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_sent_message).collect()
    }

    async fn insert_delivery_attempt(&self, attempt: &DeliveryAttempt) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO delivery_attempts (id, email_id, endpoint_id, target, payload, status, \
             attempts, response_code, response_body, latency_ms, error, last_attempt_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(attempt.id.0)
        .bind(attempt.email_id.0)
        .bind(attempt.endpoint_id.0)
        .bind(&attempt.target)
        .bind(&attempt.payload)
        .bind(attempt.status)
        .bind(attempt.attempts as i32)
        .bind(attempt.response_code.map(|c| c as i32))
        .bind(&attempt.response_body)
        .bind(attempt.latency_ms as i64)
        .bind(&attempt.error)
        .bind(attempt.last_attempt_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_sent_message_by_idempotency_key(
        &self,
        owner: UserId,
        key: &str,
    ) -> Result<Option<SentMessage>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM sent_messages WHERE owner_user = $1 AND idempotency_key = $2",
        )
        .bind(owner.0)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_sent_message(&r)).transpose()
    }

    async fn insert_sent_message(&self, message: &SentMessage) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO sent_messages (id, from_address, from_domain, to_addresses, cc, bcc, \
             reply_to, subject, text_body, html_body, headers, tags, status, message_id, \
             provider_message_id, failure_reason, idempotency_key, owner_user, \
             in_reply_to_email_id, created_at, sent_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21)",
        )
        .bind(message.id.0)
        .bind(serde_json::to_value(&message.from)?)
        .bind(&message.from_domain)
        .bind(serde_json::to_value(&message.to)?)
        .bind(serde_json::to_value(&message.cc)?)
        .bind(serde_json::to_value(&message.bcc)?)
        .bind(serde_json::to_value(&message.reply_to)?)
        .bind(&message.subject)
        .bind(&message.text_body)
        .bind(&message.html_body)
        .bind(serde_json::to_value(&message.headers)?)
        .bind(serde_json::to_value(&message.tags)?)
        .bind(message.status)
        .bind(&message.message_id)
        .bind(&message.provider_message_id)
        .bind(&message.failure_reason)
        .bind(&message.idempotency_key)
        .bind(message.owner_user.0)
        .bind(message.in_reply_to_email_id)
        .bind(message.created_at)
        .bind(message.sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_sent_message_success(
        &self,
        id: Uuid,
        provider_message_id: &str,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE sent_messages SET status = 'sent', provider_message_id = $2, sent_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(provider_message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_sent_message_failure(&self, id: Uuid, reason: &str) -> Result<(), CoreError> {
        sqlx::query("UPDATE sent_messages SET status = 'failed', failure_reason = $2 WHERE id = $1")
            .bind(id)
            .bind(reason)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_blocklist(&self, owner: Option<UserId>) -> Result<Vec<BlocklistEntry>, CoreError> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query(
                    "SELECT * FROM blocklist_entries WHERE owner_user = $1 OR owner_user IS NULL",
                )
                .bind(owner.0)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM blocklist_entries WHERE owner_user IS NULL")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter()
            .map(|row| {
                Ok(BlocklistEntry {
                    id: row.try_get("id")?,
                    owner_user: row.try_get::<Option<Uuid>, _>("owner_user")?.map(UserId),
                    pattern: row.try_get("pattern")?,
                    pattern_kind: row.try_get("pattern_kind")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM api_keys WHERE key_hash = $1 AND revoked_at IS NULL",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_api_key(&r)).transpose()
    }

    async fn touch_api_key(&self, id: Uuid) -> Result<(), CoreError> {
        sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl PgStore {
    fn row_to_sent_message(row: &sqlx::postgres::PgRow) -> Result<SentMessage, CoreError> {
        Ok(SentMessage {
            id: SentMessageId(row.try_get("id")?),
            from: serde_json::from_value(row.try_get("from_address")?)?,
            from_domain: row.try_get("from_domain")?,
            to: serde_json::from_value(row.try_get("to_addresses")?)?,
            cc: serde_json::from_value(row.try_get("cc")?)?,
            bcc: serde_json::from_value(row.try_get("bcc")?)?,
            reply_to: serde_json::from_value(row.try_get("reply_to")?)?,
            subject: row.try_get("subject")?,
            text_body: row.try_get("text_body")?,
            html_body: row.try_get("html_body")?,
            headers: serde_json::from_value(row.try_get("headers")?)?,
            tags: serde_json::from_value(row.try_get("tags")?)?,
            status: row.try_get("status")?,
            message_id: row.try_get("message_id")?,
            provider_message_id: row.try_get("provider_message_id")?,
            failure_reason: row.try_get("failure_reason")?,
            idempotency_key: row.try_get("idempotency_key")?,
            owner_user: UserId(row.try_get("owner_user")?),
            in_reply_to_email_id: row.try_get("in_reply_to_email_id")?,
            created_at: row.try_get("created_at")?,
            sent_at: row.try_get("sent_at")?,
        })
    }

    fn row_to_api_key(row: &sqlx::postgres::PgRow) -> Result<ApiKey, CoreError> {
        Ok(ApiKey {
            id: ApiKeyId(row.try_get("id")?),
            owner_user: UserId(row.try_get("owner_user")?),
            name: row.try_get("name")?,
            key_hash: row.try_get("key_hash")?,
            created_at: row.try_get("created_at")?,
            last_used_at: row.try_get("last_used_at")?,
            revoked_at: row.try_get("revoked_at")?,
        })
    }
}

/// In-process store for unit/integration tests, avoiding a live Postgres
/// instance the way the predecessor's `InMemoryIdempotencyService` does for
/// its own dependency.
#[derive(Default)]
pub struct InMemoryStore {
    domains: Mutex<HashMap<Uuid, Domain>>,
    endpoints: Mutex<HashMap<Uuid, Endpoint>>,
    email_addresses: Mutex<HashMap<Uuid, EmailAddressRecord>>,
    ingestion_events: Mutex<HashMap<Uuid, IngestionEvent>>,
    email_records: Mutex<HashMap<Uuid, EmailRecord>>,
    parsed_emails: Mutex<HashMap<Uuid, ParsedEmail>>,
    delivery_attempts: Mutex<Vec<DeliveryAttempt>>,
    sent_messages: Mutex<HashMap<Uuid, SentMessage>>,
    blocklist: Mutex<Vec<BlocklistEntry>>,
    api_keys: Mutex<HashMap<Uuid, ApiKey>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_blocklist(&self, entries: Vec<BlocklistEntry>) {
        *self.blocklist.lock().unwrap() = entries;
    }

    pub fn seed_api_key(&self, key: ApiKey) {
        self.api_keys.lock().unwrap().insert(key.id.0, key);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_domain_by_name(&self, name: &str) -> Result<Option<Domain>, CoreError> {
        Ok(self
            .domains
            .lock()
            .unwrap()
            .values()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn get_domain(&self, id: Uuid) -> Result<Option<Domain>, CoreError> {
        Ok(self.domains.lock().unwrap().get(&id).cloned())
    }

    async fn list_domains(&self, owner: UserId) -> Result<Vec<Domain>, CoreError> {
        Ok(self
            .domains
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.owner_user == owner)
            .cloned()
            .collect())
    }

    async fn create_domain(&self, domain: &Domain) -> Result<(), CoreError> {
        let mut domains = self.domains.lock().unwrap();
        if domains.values().any(|d| d.name.eq_ignore_ascii_case(&domain.name)) {
            return Err(CoreError::Conflict(format!("domain {} already exists", domain.name)));
        }
        domains.insert(domain.id.0, domain.clone());
        Ok(())
    }

    async fn set_domain_catch_all(
        &self,
        domain_id: Uuid,
        endpoint_id: Option<Uuid>,
        rule_name: Option<String>,
    ) -> Result<(), CoreError> {
        let mut domains = self.domains.lock().unwrap();
        let domain = domains
            .get_mut(&domain_id)
            .ok_or_else(|| CoreError::NotFound(format!("domain {domain_id}")))?;
        domain.set_catch_all(endpoint_id);
        domain.catch_all_rule_name = rule_name;
        Ok(())
    }

    async fn get_endpoint(&self, id: Uuid) -> Result<Option<Endpoint>, CoreError> {
        Ok(self.endpoints.lock().unwrap().get(&id).cloned())
    }

    async fn list_endpoints(&self, owner: UserId) -> Result<Vec<Endpoint>, CoreError> {
        Ok(self
            .endpoints
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.owner_user == owner)
            .cloned()
            .collect())
    }

    async fn create_endpoint(&self, endpoint: &Endpoint) -> Result<(), CoreError> {
        self.endpoints
            .lock()
            .unwrap()
            .insert(endpoint.id.0, endpoint.clone());
        Ok(())
    }

    async fn update_endpoint(&self, endpoint: &Endpoint) -> Result<(), CoreError> {
        self.endpoints
            .lock()
            .unwrap()
            .insert(endpoint.id.0, endpoint.clone());
        Ok(())
    }

    async fn delete_endpoint(&self, id: Uuid) -> Result<(), CoreError> {
        let referenced = self
            .email_addresses
            .lock()
            .unwrap()
            .values()
            .any(|a| a.endpoint_id.map(|e| e.0) == Some(id))
            || self
                .domains
                .lock()
                .unwrap()
                .values()
                .any(|d| d.catch_all_endpoint_id == Some(id));
        if referenced {
            return Err(CoreError::DependencyBusy(format!(
                "endpoint {id} still referenced"
            )));
        }
        self.endpoints.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn record_delivery_stats(&self, endpoint_id: Uuid, success: bool) -> Result<(), CoreError> {
        let mut endpoints = self.endpoints.lock().unwrap();
        if let Some(endpoint) = endpoints.get_mut(&endpoint_id) {
            endpoint.total_deliveries += 1;
            if success {
                endpoint.successful_deliveries += 1;
            } else {
                endpoint.failed_deliveries += 1;
            }
            endpoint.last_used = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn find_active_email_address(
        &self,
        address: &str,
    ) -> Result<Option<EmailAddressRecord>, CoreError> {
        Ok(self
            .email_addresses
            .lock()
            .unwrap()
            .values()
            .find(|a| a.address.eq_ignore_ascii_case(address) && a.is_active)
            .cloned())
    }

    async fn get_email_address(&self, id: Uuid) -> Result<Option<EmailAddressRecord>, CoreError> {
        Ok(self.email_addresses.lock().unwrap().get(&id).cloned())
    }

    async fn list_email_addresses_for_domain(
        &self,
        domain_id: Uuid,
    ) -> Result<Vec<EmailAddressRecord>, CoreError> {
        Ok(self
            .email_addresses
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.domain_id.0 == domain_id && a.is_active)
            .cloned()
            .collect())
    }

    async fn list_email_addresses_for_owner(&self, owner: UserId) -> Result<Vec<EmailAddressRecord>, CoreError> {
        Ok(self
            .email_addresses
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.owner_user == owner)
            .cloned()
            .collect())
    }

    async fn update_email_address(&self, record: &EmailAddressRecord) -> Result<(), CoreError> {
        self.email_addresses.lock().unwrap().insert(record.id.0, record.clone());
        Ok(())
    }

    async fn delete_email_address(&self, id: Uuid) -> Result<(), CoreError> {
        self.email_addresses.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn create_email_address(&self, record: &EmailAddressRecord) -> Result<(), CoreError> {
        self.email_addresses
            .lock()
            .unwrap()
            .insert(record.id.0, record.clone());
        Ok(())
    }

    async fn set_receipt_rule_info(
        &self,
        email_address_id: Uuid,
        rule_name: Option<String>,
        configured: bool,
    ) -> Result<(), CoreError> {
        if let Some(record) = self.email_addresses.lock().unwrap().get_mut(&email_address_id) {
            record.receipt_rule_name = rule_name;
            record.is_receipt_rule_configured = configured;
        }
        Ok(())
    }

    async fn insert_ingestion_event(&self, event: &IngestionEvent) -> Result<(), CoreError> {
        self.ingestion_events
            .lock()
            .unwrap()
            .insert(event.id.0, event.clone());
        Ok(())
    }

    async fn insert_email_record(&self, record: &EmailRecord) -> Result<(), CoreError> {
        self.email_records
            .lock()
            .unwrap()
            .insert(record.id.0, record.clone());
        Ok(())
    }

    async fn insert_parsed_email(
        &self,
        email_record_id: Uuid,
        parsed: &ParsedEmail,
    ) -> Result<(), CoreError> {
        self.parsed_emails
            .lock()
            .unwrap()
            .insert(email_record_id, parsed.clone());
        Ok(())
    }

    async fn get_email_record(&self, id: Uuid) -> Result<Option<EmailRecord>, CoreError> {
        let mut record = self.email_records.lock().unwrap().get(&id).cloned();
        if let Some(record) = record.as_mut() {
            record.parsed = self.parsed_emails.lock().unwrap().get(&id).cloned();
        }
        Ok(record)
    }

    async fn list_email_records(
        &self,
        owner: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EmailRecord>, CoreError> {
        let mut records: Vec<_> = self
            .email_records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.owner_user == owner)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn mark_email_read(&self, id: Uuid) -> Result<(), CoreError> {
        if let Some(record) = self.email_records.lock().unwrap().get_mut(&id) {
            record.is_read = true;
            record.read_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn find_email_records_by_message_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<EmailRecord>, CoreError> {
        let parsed = self.parsed_emails.lock().unwrap();
        Ok(self
            .email_records
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                ids.contains(&r.message_id)
                    || parsed.get(&r.id.0).is_some_and(|p| {
                        p.in_reply_to.as_deref().is_some_and(|t| ids.iter().any(|i| i == t))
                            || p.references.iter().any(|ref_id| ids.contains(ref_id))
                    })
            })
            .cloned()
            .collect())
    }

    async fn find_email_records_by_normalized_subject(
        &self,
        owner: UserId,
        normalized_subject: &str,
    ) -> Result<Vec<EmailRecord>, CoreError> {
        let mut records: Vec<_> = self
            .email_records
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                r.owner_user == owner
                    && r.subject
                        .as_deref()
                        .map(|s| s.to_lowercase() == normalized_subject)
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| r.received_at);
        Ok(records)
    }

    async fn find_sent_messages_by_email_ids(
        &self,
        email_ids: &[Uuid],
    ) -> Result<Vec<SentMessage>, CoreError> {
        Ok(self
            .sent_messages
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.in_reply_to_email_id.is_some_and(|id| email_ids.contains(&id)))
            .cloned()
            .collect())
    }

    async fn insert_delivery_attempt(&self, attempt: &DeliveryAttempt) -> Result<(), CoreError> {
        self.delivery_attempts.lock().unwrap().push(attempt.clone());
        Ok(())
    }

    async fn find_sent_message_by_idempotency_key(
        &self,
        owner: UserId,
        key: &str,
    ) -> Result<Option<SentMessage>, CoreError> {
        Ok(self
            .sent_messages
            .lock()
            .unwrap()
            .values()
            .find(|m| m.owner_user == owner && m.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn insert_sent_message(&self, message: &SentMessage) -> Result<(), CoreError> {
        self.sent_messages
            .lock()
            .unwrap()
            .insert(message.id.0, message.clone());
        Ok(())
    }

    async fn finalize_sent_message_success(
        &self,
        id: Uuid,
        provider_message_id: &str,
    ) -> Result<(), CoreError> {
        if let Some(message) = self.sent_messages.lock().unwrap().get_mut(&id) {
            message.status = SentStatus::Sent;
            message.provider_message_id = Some(provider_message_id.to_string());
            message.sent_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn finalize_sent_message_failure(&self, id: Uuid, reason: &str) -> Result<(), CoreError> {
        if let Some(message) = self.sent_messages.lock().unwrap().get_mut(&id) {
            message.status = SentStatus::Failed;
            message.failure_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn list_blocklist(&self, owner: Option<UserId>) -> Result<Vec<BlocklistEntry>, CoreError> {
        Ok(self
            .blocklist
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.owner_user.is_none() || e.owner_user == owner)
            .cloned()
            .collect())
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, CoreError> {
        Ok(self
            .api_keys
            .lock()
            .unwrap()
            .values()
            .find(|k| k.key_hash == key_hash && k.is_active())
            .cloned())
    }

    async fn touch_api_key(&self, id: Uuid) -> Result<(), CoreError> {
        if let Some(key) = self.api_keys.lock().unwrap().get_mut(&id) {
            key.last_used_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_domain(owner: UserId) -> Domain {
        Domain {
            id: DomainId(Uuid::new_v4()),
            name: "acme.com".to_string(),
            owner_user: owner,
            status: DomainStatus::Verified,
            can_receive: true,
            has_mx: true,
            catch_all_endpoint_id: None,
            catch_all_rule_name: None,
            is_catch_all_enabled: false,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_domain_roundtrip() {
        let store = InMemoryStore::new();
        let owner = UserId(Uuid::new_v4());
        let domain = sample_domain(owner);
        store.create_domain(&domain).await.unwrap();

        let found = store.find_domain_by_name("acme.com").await.unwrap().unwrap();
        assert_eq!(found.id.0, domain.id.0);

        let dup = store.create_domain(&sample_domain(owner)).await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_delete_endpoint_blocked_by_dependency() {
        let store = InMemoryStore::new();
        let owner = UserId(Uuid::new_v4());
        let endpoint = Endpoint {
            id: EndpointId(Uuid::new_v4()),
            name: "hook".to_string(),
            owner_user: owner,
            config: EndpointConfig::Email {
                forward_to: "a@b.com".to_string(),
            },
            is_active: true,
            total_deliveries: 0,
            successful_deliveries: 0,
            failed_deliveries: 0,
            last_used: None,
            created_at: chrono::Utc::now(),
        };
        store.create_endpoint(&endpoint).await.unwrap();

        let mut domain = sample_domain(owner);
        domain.set_catch_all(Some(endpoint.id.0));
        store.create_domain(&domain).await.unwrap();

        let result = store.delete_endpoint(endpoint.id.0).await;
        assert!(matches!(result, Err(CoreError::DependencyBusy(_))));
    }
}
