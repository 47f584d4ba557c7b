pub mod catalog_gateway;
pub mod key_value_store;
pub mod response_gateway;

pub use catalog_gateway::CatalogGateway;
pub use key_value_store::KeyValueStore;
pub use response_gateway::ResponseGateway;
