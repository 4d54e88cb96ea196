mod adagrad;
mod optimizer;

pub use adagrad::AdaGrad;
pub use optimizer::Optimizer;
