pub mod machine_learning;
pub mod server;
pub mod worker;
