//! Domain models for productivity-api

pub mod admin;
pub mod employee;
pub mod session;

pub use admin::{AdminCredential, SetupAdminRequest};
pub use employee::{AddEmployeeRequest, Employee, EmployeeUpdate, NewEmployee};
pub use session::{Claims, Identity, IssuedToken, LoginRequest, LoginResponse};
