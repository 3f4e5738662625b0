//! Delivery of committed attendance events to the external HR system.
//!
//! Appending an event enqueues a [`queue::SyncTaskQueue`] task in the same transaction.
//! The [`pipeline::SyncPipeline`] worker pool claims tasks, pushes events and records the
//! outcome, retrying transient failures under a [`policy::RetryPolicy`].
//! [`health::HrHealthCheck`] records whether the HR ingestion endpoint is reachable.

pub mod health;
pub mod identity;
pub mod notifier;
pub mod pipeline;
pub mod policy;
pub mod push;
pub mod queue;

pub use health::HrHealthCheck;
pub use identity::{EmployeeTableResolver, IdentityGap, IdentityResolver};
pub use notifier::{
    CoalescingNotifier, LogSink, NoopNotifier, RefreshNotifier, RefreshSink, WebhookSink,
    sink_from_config,
};
pub use pipeline::{
    RetryEventError, SyncCollaborators, SyncFailure, SyncPipeline, SyncSettings, TaskOutcome,
};
pub use policy::RetryPolicy;
pub use push::{
    HEALTH_CANARY_ATTENDANCE_NUMBER, HrPushClient, HttpHrPushClient, PushError, PushRequest,
    PushResponse,
};
pub use queue::SyncTaskQueue;
