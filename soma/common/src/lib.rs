//! Plain data types shared by the SOMA array crates: element datatypes,
//! open modes and result orders, shape validation, and the
//! doubly-inclusive ranges and selectors used to address cells.
//!
//! Nothing in this crate touches storage.

pub mod array;
pub mod datatype;
pub mod range;

pub use array::{ArrayType, Mode, ResultOrder};
pub use datatype::Datatype;
