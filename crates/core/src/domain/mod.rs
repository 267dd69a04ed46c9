pub mod intent;
pub mod safety;
