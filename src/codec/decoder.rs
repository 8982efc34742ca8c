//! Video decode engine contract

use crate::codec::picture::DecodedPicture;
use crate::error::CodecError;

/// Decode engine for compressed access units.
///
/// Each call must return without blocking for more than one access unit's
/// worth of work; the pipeline calls `submit` then `retrieve` once per
/// VIDEO_DATA frame.
pub trait VideoDecoder: Send {
    /// Feed one compressed access unit
    fn submit(&mut self, access_unit: &[u8]) -> Result<(), CodecError>;

    /// Take the next decoded picture
    fn retrieve(&mut self) -> Result<DecodedPicture, CodecError>;
}

/// Creates a decoder when a connection starts
pub type DecoderFactory = Box<dyn Fn() -> Result<Box<dyn VideoDecoder>, CodecError> + Send + Sync>;

/// Wrap a closure as a `DecoderFactory`
pub fn decoder_factory<F, D>(make: F) -> DecoderFactory
where
    F: Fn() -> Result<D, CodecError> + Send + Sync + 'static,
    D: VideoDecoder + 'static,
{
    Box::new(move || make().map(|d| Box::new(d) as Box<dyn VideoDecoder>))
}
