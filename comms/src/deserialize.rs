use std::io;

/// Reads a message from a byte buffer, possibly borrowing from it.
pub trait Deserialize<'a>: Sized {
    /// Should parse `buf` into `Self`.
    ///
    /// # Arguments
    /// * `buf` - The received bytes.
    ///
    /// # Returns
    /// The message or an `io::Error` of kind `InvalidData`.
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}
