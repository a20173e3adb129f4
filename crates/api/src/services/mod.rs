//! Process-internal services: the hot state store, the event bus, the
//! per-device dispatcher, the persistence writers, and the pipeline that
//! ties them together.

pub mod bus;
pub mod dispatcher;
pub mod hot_store;
pub mod ingest;
pub mod odometer;
pub mod stop_writer;
pub mod trip_writer;

pub use bus::{BusMessage, EventBus, EventBusError};
pub use dispatcher::{Dispatcher, DispatcherStats};
pub use hot_store::{HotStore, HotStoreError};
pub use ingest::IngestPipeline;
pub use odometer::{OdometerError, OdometerService};
pub use stop_writer::StopWriter;
pub use trip_writer::TripWriter;
