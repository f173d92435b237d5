pub mod advertisement;
pub mod characteristic;
pub mod identifier;
pub mod options;
pub mod state;
