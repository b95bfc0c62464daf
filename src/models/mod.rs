pub mod climate;
pub mod irrigation;
pub mod quota;
pub mod tree;

pub use climate::*;
pub use irrigation::*;
pub use quota::*;
pub use tree::*;
