//! DynamoDB table store backend

use crate::{
    AttributeValue, CreateTableRequest, DynamoStoreConfig, Item, KeyType, ListTablesPage,
    ListTablesRequest, ScalarAttributeType, ScanPage, ScanRequest, StoreError, StoreResult,
    TableStore, UpdateItemRequest,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types as sdk;
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Number of status polls while waiting for a new table to become active
const TABLE_ACTIVE_POLLS: u32 = 60;

/// DynamoDB table store backend
#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    /// Create a backend from region and endpoint configuration
    pub async fn new(config: DynamoStoreConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.get_region().clone()));

        if let Some(endpoint) = config.get_endpoint_url() {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let sdk_config = loader.load().await;
        debug!(
            region = %config.get_region(),
            endpoint = ?config.get_endpoint_url(),
            "DynamoDB store initialized"
        );
        Self::from_client(Client::new(&sdk_config))
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Underlying SDK client
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn wait_for_table_active(&self, table_name: &str) -> StoreResult<()> {
        for _ in 0..TABLE_ACTIVE_POLLS {
            let output = self
                .client
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(|e| sdk_error("describe_table", table_name, e))?;

            let status = output.table().and_then(|table| table.table_status());
            if status == Some(&sdk::TableStatus::Active) {
                debug!(table_name = %table_name, "DynamoDB table is active");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        warn!(table_name = %table_name, "DynamoDB table did not become active");
        Err(StoreError::Backend(format!(
            "table {} did not become active after {} polls",
            table_name, TABLE_ACTIVE_POLLS
        )))
    }
}

fn sdk_error<E>(operation: &str, table_name: &str, err: E) -> StoreError
where
    E: ProvideErrorMetadata + std::fmt::Display,
{
    match err.code() {
        Some("ResourceNotFoundException") => StoreError::TableNotFound(table_name.to_string()),
        Some("ResourceInUseException") if operation == "create_table" => {
            StoreError::TableExists(table_name.to_string())
        }
        code => {
            let code = code.unwrap_or("unknown").to_string();
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            error!(
                operation = %operation,
                table_name = %table_name,
                error_code = %code,
                error_message = %message,
                "DynamoDB request failed"
            );
            StoreError::Backend(format!(
                "DynamoDB {} failed: {} (code: {})",
                operation, message, code
            ))
        }
    }
}

fn build_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("Failed to build DynamoDB request: {}", err))
}

fn to_sdk_value(value: AttributeValue) -> sdk::AttributeValue {
    match value {
        AttributeValue::S(s) => sdk::AttributeValue::S(s),
        AttributeValue::N(n) => sdk::AttributeValue::N(n),
        AttributeValue::B(b) => sdk::AttributeValue::B(Blob::new(b)),
        AttributeValue::Bool(b) => sdk::AttributeValue::Bool(b),
        AttributeValue::Null => sdk::AttributeValue::Null(true),
        AttributeValue::L(values) => {
            sdk::AttributeValue::L(values.into_iter().map(to_sdk_value).collect())
        }
        AttributeValue::M(map) => sdk::AttributeValue::M(to_sdk_item(map)),
        AttributeValue::Ss(values) => sdk::AttributeValue::Ss(values),
        AttributeValue::Ns(values) => sdk::AttributeValue::Ns(values),
        AttributeValue::Bs(values) => {
            sdk::AttributeValue::Bs(values.into_iter().map(Blob::new).collect())
        }
    }
}

fn to_sdk_item(item: Item) -> HashMap<String, sdk::AttributeValue> {
    item.into_iter()
        .map(|(name, value)| (name, to_sdk_value(value)))
        .collect()
}

fn from_sdk_value(value: &sdk::AttributeValue) -> StoreResult<AttributeValue> {
    Ok(match value {
        sdk::AttributeValue::S(s) => AttributeValue::S(s.clone()),
        sdk::AttributeValue::N(n) => AttributeValue::N(n.clone()),
        sdk::AttributeValue::B(b) => AttributeValue::B(b.as_ref().to_vec()),
        sdk::AttributeValue::Bool(b) => AttributeValue::Bool(*b),
        sdk::AttributeValue::Null(_) => AttributeValue::Null,
        sdk::AttributeValue::L(values) => AttributeValue::L(
            values
                .iter()
                .map(from_sdk_value)
                .collect::<StoreResult<Vec<_>>>()?,
        ),
        sdk::AttributeValue::M(map) => AttributeValue::M(from_sdk_item(map)?),
        sdk::AttributeValue::Ss(values) => AttributeValue::Ss(values.clone()),
        sdk::AttributeValue::Ns(values) => AttributeValue::Ns(values.clone()),
        sdk::AttributeValue::Bs(values) => {
            AttributeValue::Bs(values.iter().map(|b| b.as_ref().to_vec()).collect())
        }
        _ => {
            return Err(StoreError::Backend(
                "DynamoDB returned an unknown attribute type".to_string(),
            ))
        }
    })
}

fn from_sdk_item(item: &HashMap<String, sdk::AttributeValue>) -> StoreResult<Item> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), from_sdk_value(value)?)))
        .collect()
}

#[async_trait]
impl TableStore for DynamoStore {
    async fn create_table(&self, request: CreateTableRequest) -> StoreResult<()> {
        let mut key_schema = Vec::with_capacity(request.key_schema.len());
        let mut definitions = Vec::with_capacity(request.key_schema.len());

        for element in &request.key_schema {
            let key_type = match element.key_type {
                KeyType::Hash => sdk::KeyType::Hash,
                KeyType::Range => sdk::KeyType::Range,
            };
            let attribute_type = match element.attribute_type {
                ScalarAttributeType::S => sdk::ScalarAttributeType::S,
                ScalarAttributeType::N => sdk::ScalarAttributeType::N,
                ScalarAttributeType::B => sdk::ScalarAttributeType::B,
            };

            key_schema.push(
                sdk::KeySchemaElement::builder()
                    .attribute_name(&element.attribute_name)
                    .key_type(key_type)
                    .build()
                    .map_err(build_error)?,
            );
            definitions.push(
                sdk::AttributeDefinition::builder()
                    .attribute_name(&element.attribute_name)
                    .attribute_type(attribute_type)
                    .build()
                    .map_err(build_error)?,
            );
        }

        let mut create = self
            .client
            .create_table()
            .table_name(&request.table_name)
            .set_key_schema(Some(key_schema))
            .set_attribute_definitions(Some(definitions));

        create = match request.provisioned_throughput {
            Some(throughput) => create.provisioned_throughput(
                sdk::ProvisionedThroughput::builder()
                    .read_capacity_units(throughput.read_capacity_units as i64)
                    .write_capacity_units(throughput.write_capacity_units as i64)
                    .build()
                    .map_err(build_error)?,
            ),
            None => create.billing_mode(sdk::BillingMode::PayPerRequest),
        };

        create
            .send()
            .await
            .map_err(|e| sdk_error("create_table", &request.table_name, e))?;

        debug!(table_name = %request.table_name, "DynamoDB table created");
        self.wait_for_table_active(&request.table_name).await
    }

    async fn list_tables(&self, request: ListTablesRequest) -> StoreResult<ListTablesPage> {
        let output = self
            .client
            .list_tables()
            .set_exclusive_start_table_name(request.exclusive_start_table_name)
            .set_limit(request.limit.map(|limit| limit as i32))
            .send()
            .await
            .map_err(|e| sdk_error("list_tables", "", e))?;

        Ok(ListTablesPage {
            table_names: output.table_names().to_vec(),
            last_evaluated_table_name: output.last_evaluated_table_name().map(str::to_string),
        })
    }

    async fn scan(&self, request: ScanRequest) -> StoreResult<ScanPage> {
        let output = self
            .client
            .scan()
            .table_name(&request.table_name)
            .consistent_read(request.consistent_read)
            .set_limit(request.limit.map(|limit| limit as i32))
            .set_exclusive_start_key(request.exclusive_start_key.map(to_sdk_item))
            .send()
            .await
            .map_err(|e| sdk_error("scan", &request.table_name, e))?;

        let items = output
            .items()
            .iter()
            .map(from_sdk_item)
            .collect::<StoreResult<Vec<_>>>()?;
        let last_evaluated_key = output.last_evaluated_key().map(from_sdk_item).transpose()?;

        Ok(ScanPage {
            items,
            last_evaluated_key,
        })
    }

    async fn get_item(&self, table_name: &str, key: Item) -> StoreResult<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(table_name)
            .set_key(Some(to_sdk_item(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| sdk_error("get_item", table_name, e))?;

        output.item().map(from_sdk_item).transpose()
    }

    async fn put_item(&self, table_name: &str, item: Item) -> StoreResult<()> {
        self.client
            .put_item()
            .table_name(table_name)
            .set_item(Some(to_sdk_item(item)))
            .send()
            .await
            .map_err(|e| sdk_error("put_item", table_name, e))?;
        Ok(())
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> StoreResult<()> {
        self.client
            .delete_item()
            .table_name(table_name)
            .set_key(Some(to_sdk_item(key)))
            .send()
            .await
            .map_err(|e| sdk_error("delete_item", table_name, e))?;
        Ok(())
    }

    async fn update_item(&self, request: UpdateItemRequest) -> StoreResult<()> {
        let values = if request.expression_attribute_values.is_empty() {
            None
        } else {
            Some(to_sdk_item(request.expression_attribute_values))
        };

        self.client
            .update_item()
            .table_name(&request.table_name)
            .set_key(Some(to_sdk_item(request.key)))
            .update_expression(request.update_expression)
            .set_expression_attribute_values(values)
            .set_expression_attribute_names(request.expression_attribute_names)
            .send()
            .await
            .map_err(|e| sdk_error("update_item", &request.table_name, e))?;
        Ok(())
    }
}
