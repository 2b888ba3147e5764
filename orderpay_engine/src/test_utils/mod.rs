pub mod prepare_env;
pub mod simulated_gateway;

pub use simulated_gateway::SimulatedGateway;
