pub mod account;
pub mod action;
pub mod campaign;
pub mod limits;
pub mod quota;

pub use account::*;
pub use action::*;
pub use campaign::*;
pub use limits::*;
pub use quota::*;
