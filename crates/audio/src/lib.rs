//! voicelink-audio – Audio-Bausteine der Voice-Verbindung
//!
//! - Opus Encoding/Decoding hinter austauschbaren Traits
//! - PCM-Konvertierung (16-Bit big-endian, Mono -> Stereo)
//! - Mischen mehrerer Sprecher mit Saettigung

pub mod codec;
pub mod error;
pub mod mix;
pub mod pcm;

// Bequeme Re-Exporte der wichtigsten Typen
pub use codec::{CodecProvider, FrameDecoder, FrameEncoder, OpusCodecProvider, OpusDecoder, OpusEncoder};
pub use error::{AudioError, AudioResult};
pub use mix::{mischen, stille_frame};
pub use pcm::{pcm_aus_bytes_be, pcm_zu_bytes_be, stereo_frame_aus_quelle};
