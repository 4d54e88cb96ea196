mod access;
mod kernel;
mod sigmoid;
mod unigram;

pub use access::{Word2VecAccess, Word2VecGrad, Word2VecLocal, Word2VecParam};
pub use kernel::{Word2VecInstance, Word2VecKernel, token_key};
pub use sigmoid::SigmoidTable;
pub use unigram::UnigramTable;
