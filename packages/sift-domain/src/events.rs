//! Outbox event payloads.
//!
//! Payloads are self-contained snapshots: every value the secondary store
//! needs is copied in at creation time, so an event stays applicable even
//! after the primary row it describes is gone.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum OutboxPayload {
	DocumentAdded(DocumentAdded),
	EntityMerged(EntityMerged),
	EntityRemoved(EntityRemoved),
}
impl OutboxPayload {
	pub fn event_type(&self) -> &'static str {
		match self {
			Self::DocumentAdded(_) => "document_added",
			Self::EntityMerged(_) => "entity_merged",
			Self::EntityRemoved(_) => "entity_removed",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DocumentAdded {
	pub doc_id: Uuid,
	pub source_path: String,
	pub source_type: String,
	#[serde(with = "time::serde::rfc3339")]
	pub ingested_at: OffsetDateTime,
	pub sender: PersonSnapshot,
	#[serde(default)]
	pub recipients: Vec<RecipientSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PersonSnapshot {
	pub id: Uuid,
	pub email: String,
	#[serde(default)]
	pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RecipientSnapshot {
	pub email: String,
	#[serde(default)]
	pub name: String,
	/// Header the address came from ("to", "cc", "bcc").
	#[serde(default = "default_recipient_field")]
	pub field: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct EntityMerged {
	pub from_id: Uuid,
	pub into_id: Uuid,
	#[serde(with = "time::serde::rfc3339")]
	pub merged_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct EntityRemoved {
	pub entity_id: Uuid,
}

fn default_recipient_field() -> String {
	"to".to_string()
}
