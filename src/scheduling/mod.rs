//! Booking rules: who may do what, slot conflicts, the appointment
//! lifecycle, the change-request ledger and reporting.

pub mod clients;
pub mod conflict;
pub mod ledger;
pub mod lifecycle;
pub mod policy;
pub mod reporting;
