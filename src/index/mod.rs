pub mod hash_index;
pub mod inet_index;

pub use hash_index::HashIndex;
pub use inet_index::{InetAddressIndex, InetAddressKey, MacAddressIndex, ObjectIndex};
