pub mod convergence;
pub mod crd;
pub mod error;
pub mod locality;
pub mod prom;
pub mod status;
pub mod store;

pub use error::AppError;
