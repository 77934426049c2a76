//! Webhook delivery and conditional field logic for a form-builder backend.
//!
//! Two pieces make up the crate:
//!
//! - [`logic`] computes per-field visibility, requirement and disabled state
//!   from a form schema and the values entered so far. Pure and synchronous.
//! - [`dispatcher`] delivers each stored submission to the form's enabled
//!   webhooks concurrently, with HMAC signing, per-attempt timeouts, bounded
//!   retries and one log row per webhook.
//!
//! Persistence of webhooks and logs sits behind the traits in [`store`].

pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod http_server;
pub mod logic;
pub mod schema;
pub mod signing;
pub mod store;
pub mod submission;
pub mod types;

pub use config::{Config, DispatcherConfig};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{Error, Result};
pub use logic::{
    evaluate_all_field_logic, evaluate_condition, evaluate_field_logic, evaluate_rule, FieldState,
    FormData,
};
pub use schema::{FormField, FormSchema, LogicAction, LogicCondition, LogicOperator, LogicRule};
pub use store::{JsonFileStore, WebhookConfigStore, WebhookLogStore};
pub use types::{DeliveryResult, DeliveryStatus, PayloadFormat, Webhook, WebhookLog};
