pub mod condition;
pub mod escape;
pub mod expression;
pub mod filters;
pub mod nodes;
pub mod services;
