//! Foundation types for cairn.
//!
//! Every value in a cairn store is named by the digest of its own bytes.
//! This crate holds that name ([`Score`]) and the on-disk location a name
//! resolves to ([`Addr`]). Every other cairn crate depends on `cairn-types`.

pub mod addr;
pub mod error;
pub mod score;

pub use addr::Addr;
pub use error::TypeError;
pub use score::{make_score, Score};
