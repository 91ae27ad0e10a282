pub mod gateway;
pub mod object_store;

pub use gateway::StoreGateway;
pub use object_store::ObjectStore;
