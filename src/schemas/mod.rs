pub mod internal;
pub mod requests;
pub mod responses;

pub use internal::*;
pub use requests::*;
pub use responses::*;
