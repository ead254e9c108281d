pub mod broker;
pub mod schema;

pub use broker::ReservedQueueBroker;
