pub mod entities;
pub mod history;
pub mod value_objects;
