#[cfg(feature = "authority")]
pub mod authority;

#[cfg(feature = "follower")]
pub mod follower;
