pub mod cellref;
pub mod coord;
pub mod sheet_name;
pub mod value;

pub use cellref::*;
pub use coord::*;
pub use sheet_name::*;
pub use value::*;
