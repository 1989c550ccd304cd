pub mod accounts;
pub mod campaigns;
pub mod executor;
pub mod jitter;
pub mod lane;
pub mod limits;
pub mod quota;
pub mod scheduler;

pub use accounts::*;
pub use campaigns::*;
pub use executor::*;
pub use jitter::*;
pub use lane::*;
pub use limits::*;
pub use quota::*;
pub use scheduler::*;
