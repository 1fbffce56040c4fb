use crate::firestore::models::{FieldOperator, Value, ValueType};
use crate::firestore::query::Query;
use crate::firestore::reference::{convert_serializable_to_fields, decode_document};
use crate::firestore::{FirebaseFirestore, FirestoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Collection holding one authorization record per database admin, keyed by uid.
pub const ADMINS_COLLECTION: &str = "admins";

/// Persisted link between an identity-provider account and admin rights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRecord {
    pub owner_id: String,
    pub is_admin: bool,
    #[serde(default)]
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AdminRecord {
    pub fn new(owner_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            is_admin: true,
            display_name: display_name.into(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),
}

/// Persistence operations on admin records.
#[async_trait]
pub trait AdminStore: Send + Sync {
    /// Whether at least one record with `isAdmin == true` exists.
    async fn has_any_admin(&self) -> Result<bool, StoreError>;

    async fn get(&self, owner_id: &str) -> Result<Option<AdminRecord>, StoreError>;

    /// Creates or overwrites the record keyed by `record.owner_id`.
    async fn put(&self, record: &AdminRecord) -> Result<(), StoreError>;

    /// Sets `updatedAt` without touching any other field.
    async fn touch(&self, owner_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<AdminRecord>, StoreError>;
}

const TIMESTAMP_FIELDS: &[&str] = &["createdAt", "updatedAt"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatedAt {
    updated_at: DateTime<Utc>,
}

/// Encodes `value` as document fields, storing the RFC 3339 strings chrono
/// produces for [`TIMESTAMP_FIELDS`] as Firestore `timestampValue`s.
fn encode_fields<T: Serialize>(
    value: &T,
) -> Result<HashMap<String, Value>, FirestoreError> {
    let mut fields = convert_serializable_to_fields(value)?;
    for name in TIMESTAMP_FIELDS {
        if let Some(field) = fields.get_mut(*name) {
            if let ValueType::StringValue(rfc3339) = &field.value_type {
                field.value_type = ValueType::TimestampValue(rfc3339.clone());
            }
        }
    }
    Ok(fields)
}

/// [`AdminStore`] backed by the `admins` Firestore collection.
#[derive(Clone)]
pub struct FirestoreAdminStore {
    firestore: FirebaseFirestore,
}

impl FirestoreAdminStore {
    pub fn new(firestore: FirebaseFirestore) -> Self {
        Self { firestore }
    }
}

#[async_trait]
impl AdminStore for FirestoreAdminStore {
    async fn has_any_admin(&self) -> Result<bool, StoreError> {
        let query = Query::new(ADMINS_COLLECTION)
            .where_filter("isAdmin", FieldOperator::Equal, true)?
            .limit(1);
        let snapshot = self.firestore.query(query).get().await?;
        Ok(!snapshot.empty())
    }

    async fn get(&self, owner_id: &str) -> Result<Option<AdminRecord>, StoreError> {
        let record = self
            .firestore
            .collection(ADMINS_COLLECTION)
            .doc(owner_id)
            .get()
            .await?;
        Ok(record)
    }

    async fn put(&self, record: &AdminRecord) -> Result<(), StoreError> {
        self.firestore
            .collection(ADMINS_COLLECTION)
            .doc(&record.owner_id)
            .set(encode_fields(record)?)
            .await?;
        Ok(())
    }

    async fn touch(&self, owner_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.firestore
            .collection(ADMINS_COLLECTION)
            .doc(owner_id)
            .update(
                encode_fields(&UpdatedAt { updated_at: at })?,
                Some(vec!["updatedAt".to_string()]),
            )
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AdminRecord>, StoreError> {
        let collection = self.firestore.collection(ADMINS_COLLECTION);
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = collection.list_documents(page_token.as_deref()).await?;
            for doc in page.documents {
                records.push(decode_document(doc)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(records)
    }
}
