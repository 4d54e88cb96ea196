mod cohort;

pub use cohort::Cohort;
