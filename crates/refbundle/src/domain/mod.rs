//! Pure data: pointers, tree views, and the failure taxonomy.

pub mod errors;
pub mod model;
pub mod pointer;
