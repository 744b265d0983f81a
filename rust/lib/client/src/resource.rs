//! Generic CRUD service.
//!
//! One [`ResourceClient`] per record type; the type's [`Resource`] impl
//! supplies the REST sub-path. Every mutation body goes through
//! [`Payload::prepare`] before it is sent.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crm_core::payload::normalize_id_array;
use crm_core::{FormMode, Id, ListQuery, Page, Payload};

use crate::envelope;
use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest, FileUpload, FormPart};
use crate::models::{Attachment, Comment};

/// A record type served under `<base>/<PATH>/`.
pub trait Resource: DeserializeOwned + Serialize + Send + Sync + 'static {
    /// Singular name, for messages.
    const NAME: &'static str;
    /// REST sub-path, also the key into the envelope table.
    const PATH: &'static str;
    /// Fields rewritten as numeric id arrays before submission.
    const REFERENCE_FIELDS: &'static [&'static str] = crm_core::payload::REFERENCE_FIELDS;
}

/// Multipart field carrying a record attachment.
pub const ATTACHMENT_FIELD: &str = "attachment";

pub struct ResourceClient<T: Resource> {
    api: Arc<ApiClient>,
    _phantom: PhantomData<T>,
}

impl<T: Resource> Clone for ResourceClient<T> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: Resource> ResourceClient<T> {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            _phantom: PhantomData,
        }
    }

    fn collection_path() -> String {
        format!("{}/", T::PATH)
    }

    fn item_path(id: &Id) -> String {
        format!("{}/{}/", T::PATH, id)
    }

    /// List records, flattening whatever envelope the backend uses.
    pub async fn list(&self, query: &ListQuery) -> Result<Page<T>, ApiError> {
        let req = ApiRequest::get(Self::collection_path()).query(query.to_pairs());
        let raw = self.api.value(&req).await?;
        Ok(envelope::decode_page(T::PATH, &raw))
    }

    /// Same as [`list`](Self::list) without decoding rows.
    pub async fn list_raw(&self, query: &ListQuery) -> Result<Page<Value>, ApiError> {
        let req = ApiRequest::get(Self::collection_path()).query(query.to_pairs());
        let raw = self.api.value(&req).await?;
        Ok(envelope::normalize(T::PATH, &raw))
    }

    pub async fn get(&self, id: impl Into<Id>) -> Result<T, ApiError> {
        let req = ApiRequest::get(Self::item_path(&id.into()));
        self.api.json(&req).await
    }

    pub async fn create(&self, payload: &Payload) -> Result<T, ApiError> {
        let req = ApiRequest::post(Self::collection_path()).json(payload.prepare(T::REFERENCE_FIELDS));
        self.api.json(&req).await
    }

    /// Full replace (PUT).
    pub async fn update(&self, id: impl Into<Id>, payload: &Payload) -> Result<T, ApiError> {
        let req = ApiRequest::put(Self::item_path(&id.into())).json(payload.prepare(T::REFERENCE_FIELDS));
        self.api.json(&req).await
    }

    /// Partial update (PATCH).
    pub async fn partial_update(&self, id: impl Into<Id>, payload: &Payload) -> Result<T, ApiError> {
        let req = ApiRequest::patch(Self::item_path(&id.into())).json(payload.prepare(T::REFERENCE_FIELDS));
        self.api.json(&req).await
    }

    /// Delete a record. Deleting twice surfaces the backend's answer to
    /// the second call unchanged.
    pub async fn delete(&self, id: impl Into<Id>) -> Result<(), ApiError> {
        let req = ApiRequest::delete(Self::item_path(&id.into()));
        self.api.send(&req).await
    }

    /// Submit a create form. Unassigned records go to the signed-in
    /// profile when the session knows it.
    pub async fn create_from_form(&self, form: Map<String, Value>) -> Result<T, ApiError> {
        let profile_id = self.api.session().profile_id();
        let payload = Payload::from_form(form, FormMode::Create, profile_id.as_deref());
        self.create(&payload).await
    }

    /// Submit an edit form (PUT). Never touches the assignee.
    pub async fn update_from_form(&self, id: impl Into<Id>, form: Map<String, Value>) -> Result<T, ApiError> {
        let payload = Payload::from_form(form, FormMode::Update, None);
        self.update(id, &payload).await
    }

    pub async fn add_comment(&self, id: impl Into<Id>, text: &str) -> Result<Comment, ApiError> {
        let path = format!("{}/{}/comment/", T::PATH, id.into());
        let req = ApiRequest::post(path).json(serde_json::json!({ "comment": text }));
        self.api.json(&req).await
    }

    /// Attach a file to a record. The part is always sent as `attachment`.
    pub async fn add_attachment(&self, id: impl Into<Id>, mut file: FileUpload) -> Result<Attachment, ApiError> {
        file.field = ATTACHMENT_FIELD.to_string();
        let path = format!("{}/{}/attachment/", T::PATH, id.into());
        let req = ApiRequest::post(path).multipart(vec![FormPart::File(file)]);
        self.api.json(&req).await
    }

    /// Create a record from a multipart form: the file plus text fields.
    pub async fn upload(&self, file: FileUpload, fields: &Payload) -> Result<T, ApiError> {
        let mut parts = form_parts(fields, T::REFERENCE_FIELDS);
        parts.push(FormPart::File(file));
        let req = ApiRequest::post(Self::collection_path()).multipart(parts);
        self.api.json(&req).await
    }
}

/// Flatten payload fields into multipart text parts. Reference fields
/// repeat their name once per id; other arrays and objects are sent as
/// JSON text.
fn form_parts(fields: &Payload, reference_fields: &[&str]) -> Vec<FormPart> {
    let mut parts = Vec::new();
    for (name, value) in fields.as_map() {
        if reference_fields.contains(&name.as_str()) {
            for id in normalize_id_array(Some(value)) {
                parts.push(FormPart::Text {
                    name: name.clone(),
                    value: id.to_string(),
                });
            }
            continue;
        }
        let value = match value {
            Value::Null => continue,
            Value::String(s) if s.is_empty() => continue,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        parts.push(FormPart::Text {
            name: name.clone(),
            value,
        });
    }
    parts
}
