//! Remote logging clients

pub mod remote;

pub use remote::RemoteClient;
