pub mod backup;
pub mod classes;
pub mod core;
pub mod fee_types;
pub mod ledger;
pub mod payments;
pub mod schools;
pub mod setup;
pub mod students;
