pub mod scope;
pub mod window;
