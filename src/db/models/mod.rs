//! Database models and their queries, one module per resource.

pub mod audit;
pub mod backup;
pub mod barangay;
pub mod barangay_yield;
pub mod crop;
pub mod crop_price;
pub mod submission;
pub mod user;

pub use audit::*;
pub use backup::*;
pub use barangay::*;
pub use barangay_yield::*;
pub use crop::*;
pub use crop_price::*;
pub use submission::*;
pub use user::*;
