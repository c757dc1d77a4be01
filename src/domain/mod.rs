mod amortization;
mod audit;
mod loan;
mod money;
mod pricing;
mod user;

pub use amortization::*;
pub use audit::*;
pub use loan::*;
pub use money::*;
pub use pricing::*;
pub use user::*;
