mod order;
mod select;

pub use order::{order_recipes, CircularDependency};
pub use select::{select_candidates, SelectionPolicy};

#[cfg(test)]
mod tests;
