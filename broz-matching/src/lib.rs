//! Library crate backing the `broz-matching` binary. Split out so
//! integration tests under `tests/` can drive the real spin -> pair -> vote
//! pipeline against a real (rolled-back) database connection, the same way
//! `main.rs` wires it up for production, without duplicating any of that
//! wiring in the tests themselves.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod fairness;
pub mod guardians;
pub mod heartbeat;
pub mod models;
pub mod orchestrator;
pub mod pair_creator;
pub mod profile;
pub mod routes;
pub mod schema;
pub mod selector;
pub mod socket;
pub mod state_machine;
pub mod stores;
pub mod voting;

use broz_shared::clients::rabbitmq::RabbitMQClient;
use broz_shared::clients::redis::RedisClient;
use config::AppConfig;
use profile::ProfileDirectory;

pub use db::DbPool;

pub struct AppState {
    pub db: DbPool,
    pub config: Arc<AppConfig>,
    pub rabbitmq: RabbitMQClient,
    pub redis: RedisClient,
    pub directory: Arc<dyn ProfileDirectory>,
    pub metrics_handle: PrometheusHandle,
}
