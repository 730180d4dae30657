pub mod category;
pub mod post;
pub mod tag;
pub mod user;
pub mod visitor;

pub use category::*;
pub use post::*;
pub use tag::*;
pub use user::*;
pub use visitor::*;
