pub mod machine;
pub mod program;
pub mod fitness;
pub mod population;
pub mod metrics;
