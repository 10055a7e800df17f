use bytes::{BufMut, Bytes};

/// Wire encoding shared by every frame layer (encapsulation header, CPF,
/// CIP, PCCC). `Context` carries layer-specific encode state; all current
/// implementors use `()`.
pub trait WireEncode {
    type Error: std::fmt::Debug + Send + Sync + 'static;
    type Context;

    /// Exact number of bytes `encode_to` will write.
    fn encoded_len(&self, ctx: &Self::Context) -> usize;
    fn encode_to<B: BufMut>(&self, dst: &mut B, ctx: &Self::Context) -> Result<(), Self::Error>;
}

/// Zero-copy wire decoding counterpart.
///
/// `parent` is the `Bytes` the input slice was taken from; implementors use
/// `Bytes::slice_ref` against it so parsed views share the receive buffer
/// instead of copying.
pub trait WireDecode: Sized {
    type Error: std::fmt::Debug + Send + Sync + 'static;
    type Context;

    /// Parse a value off the front of `input`, returning the remaining
    /// slice alongside it.
    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self), Self::Error>;
}
