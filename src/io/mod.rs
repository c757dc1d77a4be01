// Data export for reporting and backups.

mod export;

pub use export::*;
