pub mod coin;
pub mod price_point;
pub mod regime;
pub mod simulation;
