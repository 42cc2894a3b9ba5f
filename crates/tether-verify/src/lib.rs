//! Connection verification: turns a stored provider into a remote definition,
//! probes it with the transfer engine and classifies what went wrong.

pub mod classifier;
pub mod engine;
pub mod process;
pub mod shaper;
pub mod verifier;

pub use engine::{EngineError, RcloneEngine, TransferEngine};
pub use shaper::{shape, RemoteDescriptor};
pub use verifier::{ConnectionVerifier, VerifySettings};
