//! Manual access to the scheduled run

pub mod routes;

pub use routes::scheduler_routes;
