//! CRM API client.
//!
//! Authenticated access to the CRM REST backend: bearer and tenant
//! headers on every call, a single refresh-and-retry on 401, list
//! envelopes flattened into [`Page`]s, and a persisted [`Session`].
//!
//! # Usage
//!
//! ```ignore
//! use crm_client::{Crm, Credentials, MemoryStorage};
//!
//! let crm = Crm::new(ClientConfig::new("http://localhost:8000/api/"), Arc::new(MemoryStorage::new()))?;
//! crm.login(&Credentials::new("ada@example.com", "secret")).await?;
//! let leads = crm.leads().list(&ListQuery::new().limit(10)).await?;
//! ```

pub mod crm;
pub mod envelope;
pub mod error;
pub mod http;
pub mod models;
pub mod resource;
pub mod session;
pub mod storage;

pub use crm::{Crm, SearchResults};
pub use error::{ApiError, FieldErrors};
pub use http::{ApiClient, ApiRequest, FileUpload, FormPart, LoginRedirect, NoRedirect, RequestBody};
pub use models::*;
pub use resource::{Resource, ResourceClient};
pub use session::{Credentials, Session, SessionState};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};

pub use crm_core::{ClientConfig, FormMode, Id, ListQuery, Page, Payload};
