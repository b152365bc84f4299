//! Demo generator backend: a small 3x3 convolution stack evaluated on the
//! CPU in row bands, with a command queue standing in for the GPU.
//!
//! ```text
//!   weights.json ──▶ JsonWeights ──▶ WeightTable ──▶ ConvGenerator
//!                                                       │ step()
//!   Texture (source) ────────────────────────────────▶  ├─▶ CommandQueue ──flush──▶ submission log
//!                                                       ▼
//!                                                   Texture (output)
//! ```

mod network;
mod queue;
mod texture;
mod weights;

pub use network::{ConvError, ConvGenerator, ConvNet};
pub use queue::{Command, CommandQueue, QueueStats};
pub use texture::{Texture, TextureError};
pub use weights::{write_weights, JsonWeights, Tensor, WeightError, WeightTable, WEIGHTS_FORMAT};
