pub mod enforcer;
pub mod parser;

pub use enforcer::enforce_constraints;
pub use parser::{parse_constraints, Gender, TargetingConstraints};
