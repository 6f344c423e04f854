pub mod appointment;
pub mod consultation;
pub mod doctor_profile;
pub mod enums;
pub mod medication;
pub mod mental_health;
pub mod patient_profile;
pub mod payment;
pub mod prescription;
pub mod staff;
pub mod user;

pub use appointment::*;
pub use consultation::*;
pub use doctor_profile::*;
pub use enums::*;
pub use medication::*;
pub use mental_health::*;
pub use patient_profile::*;
pub use payment::*;
pub use prescription::*;
pub use staff::*;
pub use user::*;
