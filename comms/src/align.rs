// Primitive number types whose alignment is a multiple of 8 bytes, every payload
// kind (keys and values) can be viewed in place from a buffer of these.
pub trait Align8: bytemuck::Pod {}

impl Align8 for u64 {}
impl Align8 for i64 {}
impl Align8 for u128 {}
impl Align8 for i128 {}
impl Align8 for f64 {}
