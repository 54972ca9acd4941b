//! Job pipeline — records, queue, worker, lifecycle service and HTTP routes.

pub mod model;
pub mod queue;
pub mod routes;
pub mod service;
pub mod worker;

pub use model::{JobRecord, JobStatus, JobUpdate, JobView, Members, Resolution, WorkItem};
pub use queue::{Dequeued, TaskQueue};
pub use routes::job_routes;
pub use service::{JobService, Pipeline, QueueStatus};
pub use worker::{InFlight, Worker, WorkerDeps};
