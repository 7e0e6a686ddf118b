//! Chain services and the factory that hands them out.

pub mod client;
pub mod factory;
pub mod traits;

#[cfg(feature = "bitcoin")]
pub mod bitcoin;
#[cfg(feature = "ethereum")]
pub mod ethereum;

pub use factory::ChainServiceFactory;
pub use traits::BlockchainService;
