//! Visitors domain module: visitor registrations, appointments and the staff
//! directory.
//!
//! This crate contains business rules only, implemented as deterministic domain
//! logic (no IO, no HTTP, no storage). Callers pass `now` explicitly.

pub mod appointment;
pub mod photo;
pub mod staff;
pub mod visitor;

pub use appointment::{Appointment, AppointmentStatus, AppointmentUpdate, NewAppointment};
pub use photo::PhotoUpload;
pub use staff::{NewUser, User, UserUpdate};
pub use visitor::{NewVisitor, Visitor, VisitorDecision, VisitorStatus, VisitorUpdate};
