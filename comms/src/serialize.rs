/// Writes a message into a byte buffer.
pub trait Serialize<'a> {
    /// Should write the owned part of the message into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The buffer to write into.
    ///
    /// # Returns
    /// An optional borrowed tail that will be written right after `buf` without copying.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
