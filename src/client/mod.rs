//! Client-side netcode
//!
//! Prediction and reconciliation for the local player; interpolation and
//! dead reckoning for everyone else. Nothing here touches the network: the
//! caller feeds in received messages and reads out positions each frame.

pub mod extrapolation;
pub mod input;
pub mod interpolation;
pub mod prediction;
pub mod remote;

pub use extrapolation::DeadReckoning;
pub use input::{InputIntent, InputTranslator, KeyState};
pub use interpolation::{Interpolator, SnapshotBuffer, TimedSample};
pub use prediction::{PredictionEngine, Reconciliation};
pub use remote::{RemotePlayers, RemoteView};
