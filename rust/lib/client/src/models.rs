//! CRM records as the backend returns them.
//!
//! Every descriptive field is optional and every unknown field is kept in
//! `extra`, so a record decodes as long as the row is a JSON object.

use crm_core::Id;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::resource::Resource;

/// Reference to another record: a bare id or an embedded object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref {
    Id(Id),
    Object(Map<String, Value>),
}

impl Ref {
    /// Id of the referenced record, if it has one.
    pub fn id(&self) -> Option<Id> {
        match self {
            Ref::Id(id) => Some(id.clone()),
            Ref::Object(obj) => obj
                .get("id")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
        }
    }
}

/// Accept a string, number, or bool where the backend is inconsistent
/// about quoting (amounts, probabilities, counts).
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Reference lists decode `null` as empty; the backend sends it for
/// records nobody was assigned to.
fn lenient_refs<'de, D>(deserializer: D) -> Result<Vec<Ref>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Ref>>::deserialize(deserializer)?.unwrap_or_default())
}

macro_rules! resource {
    ($ty:ty, $name:literal, $path:literal) => {
        impl Resource for $ty {
            const NAME: &'static str = $name;
            const PATH: &'static str = $path;
        }
    };
    ($ty:ty, $name:literal, $path:literal, $refs:expr) => {
        impl Resource for $ty {
            const NAME: &'static str = $name;
            const PATH: &'static str = $path;
            const REFERENCE_FIELDS: &'static [&'static str] = $refs;
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lead {
    pub id: Option<Id>,
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub account_name: Option<String>,
    pub website: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub opportunity_amount: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub contacts: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub teams: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(Lead, "lead", "leads");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    pub id: Option<Id>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub billing_city: Option<String>,
    pub billing_country: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub contacts: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub teams: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(Account, "account", "accounts");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub id: Option<Id>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub primary_email: Option<String>,
    pub mobile_number: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub teams: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(Contact, "contact", "contacts");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Opportunity {
    pub id: Option<Id>,
    pub name: Option<String>,
    pub account: Option<Ref>,
    pub stage: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub amount: Option<String>,
    pub currency: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub probability: Option<String>,
    pub closed_on: Option<String>,
    pub lead_source: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub contacts: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub teams: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(Opportunity, "opportunity", "opportunities");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: Option<Id>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub account: Option<Ref>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub contacts: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub teams: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(Task, "task", "tasks");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub id: Option<Id>,
    pub name: Option<String>,
    pub event_type: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub end_date: Option<String>,
    pub end_time: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub contacts: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub teams: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(Event, "event", "events");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Case {
    pub id: Option<Id>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub case_type: Option<String>,
    pub account: Option<Ref>,
    pub closed_on: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub contacts: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub teams: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(Case, "case", "cases");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Team {
    pub id: Option<Id>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub users: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(Team, "team", "teams", &["users", "assigned_to"]);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub id: Option<Id>,
    pub title: Option<String>,
    pub document_file: Option<String>,
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub shared_to: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub teams: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(Document, "document", "documents", &["shared_to", "assigned_to", "teams"]);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Invoice {
    pub id: Option<Id>,
    pub invoice_title: Option<String>,
    pub invoice_number: Option<String>,
    pub status: Option<String>,
    pub currency: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub total_amount: Option<String>,
    pub due_date: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub accounts: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    #[serde(deserialize_with = "lenient_refs")]
    pub teams: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(Invoice, "invoice", "invoices", &["accounts", "assigned_to", "teams"]);

/// Calendar entry in the planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerEvent {
    pub id: Option<Id>,
    pub name: Option<String>,
    pub event_type: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_refs")]
    pub assigned_to: Vec<Ref>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(PlannerEvent, "planner event", "planner");

/// The signed-in user's profile within an organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub id: Option<Id>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
resource!(UserProfile, "user", "users");

impl UserProfile {
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return full;
        }
        self.email.clone().unwrap_or_else(|| "unknown".to_string())
    }
}

/// Tenant the user belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Organization {
    pub id: Option<Id>,
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: Option<Id>,
    pub comment: Option<String>,
    pub commented_by: Option<Ref>,
    pub commented_on: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub id: Option<Id>,
    pub file_name: Option<String>,
    pub attachment: Option<String>,
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
