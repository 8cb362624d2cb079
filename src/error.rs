//! Error types for the `sparsemap_rs` crate.

/// Errors surfaced by table operations and the serialization codec.
///
/// Contract violations (erasing a slot that holds no value, out-of-range
/// slot indices) are not represented here; those are debug assertions.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The allocator refused an allocation. The table is left unchanged.
    #[error("allocation failed")]
    OutOfMemory,

    /// A requested bucket count exceeds what the growth policy can represent.
    #[error("bucket count {requested} exceeds the growth policy maximum {max}")]
    LengthExceeded {
        /// The bucket count that was asked for.
        requested: usize,
        /// The largest bucket count the policy supports.
        max: usize,
    },

    /// The serialized stream is malformed: bad magic, unsupported version,
    /// or internally inconsistent counts.
    #[error("corrupt serialized stream: {0}")]
    CorruptStream(&'static str),

    /// The serialized stream is well-formed but was written by a table whose
    /// compile-time configuration differs from the loader's, and the fast
    /// (layout-trusting) deserialization mode cannot reconcile them.
    #[error("incompatible serialized schema: {0}")]
    IncompatibleSchema(&'static str),

    /// A lookup that demands presence did not find the key.
    #[error("key not present in the table")]
    KeyAbsent,

    /// The caller-supplied value codec reported a failure.
    #[error("value codec error: {0}")]
    ValueCodec(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The underlying stream failed during serialization or deserialization.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an arbitrary error from a caller-supplied [`ValueCodec`].
    ///
    /// [`ValueCodec`]: crate::codec::ValueCodec
    pub fn value_codec<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::ValueCodec(Box::new(err))
    }
}
