pub mod linear;
pub mod word2vec;

pub use linear::{LinearAccess, LinearKernel};
pub use word2vec::{Word2VecAccess, Word2VecKernel};
