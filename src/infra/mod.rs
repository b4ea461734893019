//! Connections to the outside world: object storage and the named
//! connection profiles that configure it.

pub mod profiles;
pub mod storage;
